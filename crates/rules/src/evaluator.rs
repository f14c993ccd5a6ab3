//! Rule Evaluator
//!
//! Evaluates boolean rhai expressions against a data point. This is the single
//! authority for rule truth, used both when testing a rule and upstream when
//! deciding whether an event fires.

use crate::RuleError;
use chrono::Utc;
use models::{Point, PointValue};
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, Scope, FLOAT, INT};
use tracing::debug;

const MAX_OPERATIONS: u64 = 100_000;
const MAX_CALL_LEVELS: usize = 16;
const MAX_STRING_SIZE: usize = 64 * 1024;

const DISABLED_SYMBOLS: &[&str] = &["eval", "import", "export", "print", "debug"];

/// Sandboxed rhai engine for rule expressions
pub struct RuleEvaluator {
    engine: Engine,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_string_size(MAX_STRING_SIZE);
        for &symbol in DISABLED_SYMBOLS {
            engine.disable_symbol(symbol);
        }
        reject_string_concat(&mut engine);

        Self { engine }
    }

    /// Evaluate `expr` against `point`.
    ///
    /// Bindings: `point` (map of the point's fields), `pointTS` (point time,
    /// epoch seconds), `currTS` (now, epoch seconds) and `pointVal` for int,
    /// float, string and bool points. Byte points get no `pointVal`.
    pub fn evaluate(&self, point: &Point, expr: &str) -> Result<bool, RuleError> {
        let mut scope = Scope::new();
        scope.push_constant("point", point_map(point));
        scope.push_constant("pointTS", point.ts.timestamp());
        scope.push_constant("currTS", Utc::now().timestamp());
        if let Some(value) = scalar_value(point.value.as_ref()) {
            scope.push_constant("pointVal", value);
        }

        let result = self
            .engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, expr)
            .map_err(|e| RuleError::Expression(e.to_string()))?;

        debug!(expr, result = %result, "Evaluated rule expression");
        result
            .as_bool()
            .map_err(|_| RuleError::NotBoolean(result.type_name().to_string()))
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate a rule once, for the "test a rule" capability
pub fn test_rule(point: &Point, expr: &str) -> Result<bool, RuleError> {
    RuleEvaluator::new().evaluate(point, expr)
}

/// Rule expressions compare values, so `+` between a string and a scalar is a
/// type error instead of the implicit concatenation rhai allows.
fn reject_string_concat(engine: &mut Engine) {
    engine.set_fast_operators(false);
    engine
        .register_fn("+", |_: INT, _: ImmutableString| mismatch("i64", "string"))
        .register_fn("+", |_: ImmutableString, _: INT| mismatch("string", "i64"))
        .register_fn("+", |_: FLOAT, _: ImmutableString| mismatch("f64", "string"))
        .register_fn("+", |_: ImmutableString, _: FLOAT| mismatch("string", "f64"))
        .register_fn("+", |_: bool, _: ImmutableString| mismatch("bool", "string"))
        .register_fn("+", |_: ImmutableString, _: bool| mismatch("string", "bool"));
}

fn mismatch(expected: &str, actual: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    Err(EvalAltResult::ErrorMismatchDataType(
        expected.to_string(),
        actual.to_string(),
        Position::NONE,
    )
    .into())
}

fn scalar_value(value: Option<&PointValue>) -> Option<Dynamic> {
    match value? {
        PointValue::Int(v) => Some(Dynamic::from_int(*v)),
        PointValue::Float(v) => Some(Dynamic::from_float(*v)),
        PointValue::Str(v) => Some(Dynamic::from(v.clone())),
        PointValue::Bool(v) => Some(Dynamic::from_bool(*v)),
        PointValue::Bytes(_) => None,
    }
}

fn point_map(point: &Point) -> Map {
    let mut map = Map::new();
    map.insert("uniqId".into(), point.uniq_id.clone().into());
    map.insert("attr".into(), point.attr.clone().into());
    map.insert("ts".into(), Dynamic::from_int(point.ts.timestamp()));
    map.insert("traceId".into(), point.trace_id.clone().into());

    match &point.value {
        Some(PointValue::Bytes(bytes)) => {
            map.insert("bytesVal".into(), Dynamic::from_blob(bytes.clone()));
        }
        Some(PointValue::Int(v)) => {
            map.insert("intVal".into(), Dynamic::from_int(*v));
        }
        Some(PointValue::Float(v)) => {
            map.insert("fl64Val".into(), Dynamic::from_float(*v));
        }
        Some(PointValue::Str(v)) => {
            map.insert("strVal".into(), v.clone().into());
        }
        Some(PointValue::Bool(v)) => {
            map.insert("boolVal".into(), Dynamic::from_bool(*v));
        }
        None => {}
    }
    map
}
