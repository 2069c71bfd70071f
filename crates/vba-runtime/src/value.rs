//! Dynamic runtime values and their coercion rules.
//!
//! Coercions are total: every value converts to every primitive target,
//! with `NaN` standing in for "no numeric interpretation". Operators that
//! can actually fail (integer division, modulo) return errors instead.

use crate::ast::BinaryOp;
use crate::error::VbaError;
use crate::host::HostObject;

/// Days between the OLE automation epoch (1899-12-30) and the Unix epoch.
pub const OLE_EPOCH_OFFSET_DAYS: f64 = 25569.0;

pub const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// An uninitialized variable.
    #[default]
    Empty,
    /// The null object reference.
    Nothing,
    Boolean(bool),
    Number(f64),
    String(String),
    /// OLE automation date: days since 1899-12-30, fractional days for
    /// the time of day.
    Date(f64),
    Object(HostObject),
    Array(Vec<Value>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl Value {
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Empty => 0.0,
            Value::Nothing => f64::NAN,
            Value::Boolean(true) => -1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Date(days) => *days,
            Value::Object(_) | Value::Array(_) => f64::NAN,
        }
    }

    pub fn to_vba_string(&self) -> String {
        match self {
            Value::Empty | Value::Nothing => String::new(),
            Value::Boolean(true) => "True".to_string(),
            Value::Boolean(false) => "False".to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Date(days) => format_date(*days),
            Value::Object(object) => format!("[object {}]", object.type_tag),
            Value::Array(_) => "[Array]".to_string(),
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Empty | Value::Nothing => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Date(days) => *days != 0.0,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    false
                } else if trimmed.eq_ignore_ascii_case("true") {
                    true
                } else if trimmed.eq_ignore_ascii_case("false") {
                    false
                } else {
                    match trimmed.parse::<f64>() {
                        Ok(n) => n != 0.0,
                        Err(_) => true,
                    }
                }
            }
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    /// Truncate and clamp into the 16-bit signed range.
    pub fn to_integer(&self) -> i16 {
        clamp_truncate(self.to_number(), i16::MIN as f64, i16::MAX as f64) as i16
    }

    /// Truncate and clamp into the 32-bit signed range.
    pub fn to_long(&self) -> i32 {
        clamp_truncate(self.to_number(), i32::MIN as f64, i32::MAX as f64) as i32
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Empty => "Empty".to_string(),
            Value::Nothing => "Nothing".to_string(),
            Value::Boolean(_) => "Boolean".to_string(),
            Value::Number(_) => "Double".to_string(),
            Value::String(_) => "String".to_string(),
            Value::Date(_) => "Date".to_string(),
            Value::Object(object) => object.type_tag.clone(),
            Value::Array(_) => "Variant()".to_string(),
        }
    }
}

fn clamp_truncate(n: f64, min: f64, max: f64) -> f64 {
    if n.is_nan() {
        return 0.0;
    }
    n.trunc().clamp(min, max)
}

/// Default number formatting: integral doubles print without a decimal
/// point.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// `M/D/YYYY` rendering of an OLE date.
fn format_date(days: f64) -> String {
    match ole_to_datetime(days) {
        Some(dt) => {
            use chrono::Datelike;
            format!("{}/{}/{}", dt.month(), dt.day(), dt.year())
        }
        None => "Invalid Date".to_string(),
    }
}

/// OLE automation days to a calendar date-time.
pub fn ole_to_datetime(days: f64) -> Option<chrono::NaiveDateTime> {
    if !days.is_finite() {
        return None;
    }
    let whole = days.floor();
    let seconds = ((days - whole) * 86_400.0).round() as i64;
    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    epoch
        .checked_add_signed(chrono::Duration::days(whole as i64))?
        .checked_add_signed(chrono::Duration::seconds(seconds))
}

/// Interpret date-literal or `CDate` text. Accepts ISO dates, `M/D/YYYY`,
/// optional time-of-day, and bare times.
pub fn parse_date_text(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime_to_ole(dt));
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, format) {
            return Some(datetime_to_ole(date.and_hms_opt(0, 0, 0)?));
        }
    }
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = chrono::NaiveTime::parse_from_str(trimmed, format) {
            use chrono::Timelike;
            return Some(f64::from(time.num_seconds_from_midnight()) / 86_400.0);
        }
    }
    None
}

/// Calendar date-time to OLE automation days.
pub fn datetime_to_ole(dt: chrono::NaiveDateTime) -> f64 {
    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
        .expect("valid epoch")
        .and_hms_opt(0, 0, 0)
        .expect("valid epoch time");
    let delta = dt.signed_duration_since(epoch);
    delta.num_milliseconds() as f64 / MS_PER_DAY
}

/// Binary operator evaluation over already-evaluated operands. `Is` and
/// `Like` have dedicated handling in the evaluator.
pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, VbaError> {
    match op {
        BinaryOp::Add => {
            // String + String concatenates; anything else adds.
            if left.is_string() && right.is_string() {
                Ok(Value::String(format!(
                    "{}{}",
                    left.to_vba_string(),
                    right.to_vba_string()
                )))
            } else {
                Ok(Value::Number(left.to_number() + right.to_number()))
            }
        }
        BinaryOp::Sub => Ok(Value::Number(left.to_number() - right.to_number())),
        BinaryOp::Mul => Ok(Value::Number(left.to_number() * right.to_number())),
        BinaryOp::Div => Ok(Value::Number(left.to_number() / right.to_number())),
        BinaryOp::Pow => Ok(Value::Number(left.to_number().powf(right.to_number()))),
        BinaryOp::Concat => Ok(Value::String(format!(
            "{}{}",
            left.to_vba_string(),
            right.to_vba_string()
        ))),
        BinaryOp::IntDiv => {
            let divisor = right.to_long();
            if divisor == 0 {
                return Err(VbaError::DivisionByZero);
            }
            Ok(Value::Number(
                (left.to_long().wrapping_div(divisor)) as f64,
            ))
        }
        BinaryOp::Mod => {
            let divisor = right.to_long();
            if divisor == 0 {
                return Err(VbaError::DivisionByZero);
            }
            Ok(Value::Number(
                (left.to_long().wrapping_rem(divisor)) as f64,
            ))
        }
        BinaryOp::Eq => Ok(Value::Boolean(compare(left, right) == std::cmp::Ordering::Equal)),
        BinaryOp::Ne => Ok(Value::Boolean(compare(left, right) != std::cmp::Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Boolean(compare(left, right) == std::cmp::Ordering::Less)),
        BinaryOp::Gt => Ok(Value::Boolean(
            compare(left, right) == std::cmp::Ordering::Greater,
        )),
        BinaryOp::Le => Ok(Value::Boolean(compare(left, right) != std::cmp::Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Boolean(compare(left, right) != std::cmp::Ordering::Less)),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Eqv | BinaryOp::Imp => {
            Ok(apply_logical(op, left, right))
        }
        BinaryOp::Is | BinaryOp::Like => Err(VbaError::Generic(format!(
            "operator {op:?} requires evaluator context"
        ))),
    }
}

/// Logical operators are boolean on two booleans and bitwise (32-bit)
/// otherwise. Neither form short-circuits.
fn apply_logical(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if let (Value::Boolean(a), Value::Boolean(b)) = (left, right) {
        let result = match op {
            BinaryOp::And => *a && *b,
            BinaryOp::Or => *a || *b,
            BinaryOp::Xor => a != b,
            BinaryOp::Eqv => a == b,
            BinaryOp::Imp => !*a || *b,
            _ => unreachable!(),
        };
        return Value::Boolean(result);
    }
    let a = left.to_long();
    let b = right.to_long();
    let result = match op {
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Eqv => !(a ^ b),
        BinaryOp::Imp => !a | b,
        _ => unreachable!(),
    };
    Value::Number(result as f64)
}

/// Comparison: numeric when both sides coerce to numbers, otherwise
/// case-insensitive lexicographic.
pub fn compare(left: &Value, right: &Value) -> std::cmp::Ordering {
    let a = left.to_number();
    let b = right.to_number();
    if !a.is_nan() && !b.is_nan() {
        return a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
    }
    let a = left.to_vba_string().to_lowercase();
    let b = right.to_vba_string().to_lowercase();
    a.cmp(&b)
}
