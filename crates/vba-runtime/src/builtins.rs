//! Intrinsic function registry.
//!
//! One process-wide, read-only table populated on first use. Every
//! builtin validates its own arity and answers `InvalidProcedureCall`
//! carrying its name on mismatch. Interaction functions (`MsgBox`,
//! `InputBox`) are side-effect-free stubs returning defaults.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use chrono::{Datelike, Timelike};

use crate::error::VbaError;
use crate::value::{datetime_to_ole, ole_to_datetime, parse_date_text, Value};

pub type BuiltinFn = fn(&[Value]) -> Result<Value, VbaError>;

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    registry().get(name.to_lowercase().as_str()).copied()
}

fn registry() -> &'static HashMap<&'static str, BuiltinFn> {
    static REGISTRY: OnceLock<HashMap<&'static str, BuiltinFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut table: HashMap<&'static str, BuiltinFn> = HashMap::new();
        // Math.
        table.insert("abs", builtin_abs);
        table.insert("int", builtin_int);
        table.insert("fix", builtin_fix);
        table.insert("sgn", builtin_sgn);
        table.insert("sqr", builtin_sqr);
        table.insert("exp", builtin_exp);
        table.insert("log", builtin_log);
        table.insert("sin", builtin_sin);
        table.insert("cos", builtin_cos);
        table.insert("tan", builtin_tan);
        table.insert("atn", builtin_atn);
        table.insert("rnd", builtin_rnd);
        table.insert("round", builtin_round);
        // String.
        table.insert("len", builtin_len);
        table.insert("left", builtin_left);
        table.insert("right", builtin_right);
        table.insert("mid", builtin_mid);
        table.insert("instr", builtin_instr);
        table.insert("instrrev", builtin_instrrev);
        table.insert("lcase", builtin_lcase);
        table.insert("ucase", builtin_ucase);
        table.insert("trim", builtin_trim);
        table.insert("ltrim", builtin_ltrim);
        table.insert("rtrim", builtin_rtrim);
        table.insert("replace", builtin_replace);
        table.insert("space", builtin_space);
        table.insert("string", builtin_string);
        table.insert("chr", builtin_chr);
        table.insert("asc", builtin_asc);
        table.insert("strreverse", builtin_strreverse);
        table.insert("split", builtin_split);
        table.insert("join", builtin_join);
        // Conversion and classification.
        table.insert("cbool", builtin_cbool);
        table.insert("cbyte", builtin_cbyte);
        table.insert("cint", builtin_cint);
        table.insert("clng", builtin_clng);
        table.insert("csng", builtin_cdbl);
        table.insert("cdbl", builtin_cdbl);
        table.insert("cstr", builtin_cstr);
        table.insert("cdate", builtin_cdate);
        table.insert("cvar", builtin_cvar);
        table.insert("isnull", builtin_isnull);
        table.insert("isempty", builtin_isempty);
        table.insert("isnothing", builtin_isnothing);
        table.insert("isarray", builtin_isarray);
        table.insert("isdate", builtin_isdate);
        table.insert("isnumeric", builtin_isnumeric);
        table.insert("isobject", builtin_isobject);
        table.insert("typename", builtin_typename);
        table.insert("vartype", builtin_vartype);
        // Date and time.
        table.insert("now", builtin_now);
        table.insert("date", builtin_date);
        table.insert("time", builtin_time);
        table.insert("year", builtin_year);
        table.insert("month", builtin_month);
        table.insert("day", builtin_day);
        table.insert("hour", builtin_hour);
        table.insert("minute", builtin_minute);
        table.insert("second", builtin_second);
        table.insert("weekday", builtin_weekday);
        table.insert("dateserial", builtin_dateserial);
        table.insert("timeserial", builtin_timeserial);
        table.insert("dateadd", builtin_dateadd);
        table.insert("datediff", builtin_datediff);
        // Array.
        table.insert("array", builtin_array);
        table.insert("lbound", builtin_lbound);
        table.insert("ubound", builtin_ubound);
        // Utility.
        table.insert("iif", builtin_iif);
        table.insert("choose", builtin_choose);
        table.insert("switch", builtin_switch);
        table.insert("format", builtin_format);
        // Interaction stubs.
        table.insert("msgbox", builtin_msgbox);
        table.insert("inputbox", builtin_inputbox);
        table
    })
}

fn need(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), VbaError> {
    if args.len() < min || args.len() > max {
        return Err(VbaError::InvalidProcedureCall(name.to_string()));
    }
    Ok(())
}

/// Round half to even, the legacy rounding rule.
fn round_half_even(n: f64) -> f64 {
    let floor = n.floor();
    let diff = n - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

fn to_date_days(value: &Value) -> Result<f64, VbaError> {
    match value {
        Value::Date(days) => Ok(*days),
        Value::Number(n) => Ok(*n),
        Value::Empty => Ok(0.0),
        Value::String(s) => parse_date_text(s).ok_or(VbaError::TypeMismatch),
        _ => Err(VbaError::TypeMismatch),
    }
}

fn date_part<F: Fn(chrono::NaiveDateTime) -> f64>(
    name: &str,
    args: &[Value],
    part: F,
) -> Result<Value, VbaError> {
    need(name, args, 1, 1)?;
    let days = to_date_days(&args[0])?;
    let dt = ole_to_datetime(days).ok_or(VbaError::TypeMismatch)?;
    Ok(Value::Number(part(dt)))
}

// ----- math ----------------------------------------------------------

fn builtin_abs(args: &[Value]) -> Result<Value, VbaError> {
    need("Abs", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().abs()))
}

fn builtin_int(args: &[Value]) -> Result<Value, VbaError> {
    need("Int", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().floor()))
}

fn builtin_fix(args: &[Value]) -> Result<Value, VbaError> {
    need("Fix", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().trunc()))
}

fn builtin_sgn(args: &[Value]) -> Result<Value, VbaError> {
    need("Sgn", args, 1, 1)?;
    let n = args[0].to_number();
    Ok(Value::Number(if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    }))
}

fn builtin_sqr(args: &[Value]) -> Result<Value, VbaError> {
    need("Sqr", args, 1, 1)?;
    let n = args[0].to_number();
    if n < 0.0 {
        return Err(VbaError::InvalidProcedureCall("Sqr".to_string()));
    }
    Ok(Value::Number(n.sqrt()))
}

fn builtin_exp(args: &[Value]) -> Result<Value, VbaError> {
    need("Exp", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().exp()))
}

fn builtin_log(args: &[Value]) -> Result<Value, VbaError> {
    need("Log", args, 1, 1)?;
    let n = args[0].to_number();
    if n <= 0.0 {
        return Err(VbaError::InvalidProcedureCall("Log".to_string()));
    }
    Ok(Value::Number(n.ln()))
}

fn builtin_sin(args: &[Value]) -> Result<Value, VbaError> {
    need("Sin", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().sin()))
}

fn builtin_cos(args: &[Value]) -> Result<Value, VbaError> {
    need("Cos", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().cos()))
}

fn builtin_tan(args: &[Value]) -> Result<Value, VbaError> {
    need("Tan", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().tan()))
}

fn builtin_atn(args: &[Value]) -> Result<Value, VbaError> {
    need("Atn", args, 1, 1)?;
    Ok(Value::Number(args[0].to_number().atan()))
}

fn builtin_rnd(args: &[Value]) -> Result<Value, VbaError> {
    need("Rnd", args, 0, 1)?;
    static STATE: AtomicU64 = AtomicU64::new(0x853C_49E6_748F_EA9B);
    let next = STATE
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |s| {
            Some(s.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407))
        })
        .unwrap_or_default();
    Ok(Value::Number((next >> 11) as f64 / (1u64 << 53) as f64))
}

fn builtin_round(args: &[Value]) -> Result<Value, VbaError> {
    need("Round", args, 1, 2)?;
    let digits = args.get(1).map(|d| d.to_long()).unwrap_or(0);
    let factor = 10f64.powi(digits);
    Ok(Value::Number(
        round_half_even(args[0].to_number() * factor) / factor,
    ))
}

// ----- string --------------------------------------------------------

fn builtin_len(args: &[Value]) -> Result<Value, VbaError> {
    need("Len", args, 1, 1)?;
    Ok(Value::Number(args[0].to_vba_string().chars().count() as f64))
}

fn builtin_left(args: &[Value]) -> Result<Value, VbaError> {
    need("Left", args, 2, 2)?;
    let s = args[0].to_vba_string();
    let n = args[1].to_long().max(0) as usize;
    Ok(Value::String(s.chars().take(n).collect()))
}

fn builtin_right(args: &[Value]) -> Result<Value, VbaError> {
    need("Right", args, 2, 2)?;
    let s = args[0].to_vba_string();
    let n = args[1].to_long().max(0) as usize;
    let count = s.chars().count();
    Ok(Value::String(s.chars().skip(count.saturating_sub(n)).collect()))
}

fn builtin_mid(args: &[Value]) -> Result<Value, VbaError> {
    need("Mid", args, 2, 3)?;
    let s = args[0].to_vba_string();
    let start = (args[1].to_long().max(1) - 1) as usize;
    let chars = s.chars().skip(start);
    let out: String = match args.get(2) {
        Some(len) => chars.take(len.to_long().max(0) as usize).collect(),
        None => chars.collect(),
    };
    Ok(Value::String(out))
}

fn builtin_instr(args: &[Value]) -> Result<Value, VbaError> {
    need("InStr", args, 2, 3)?;
    let (start, haystack, needle) = if args.len() == 3 {
        (
            args[0].to_long().max(1) as usize,
            args[1].to_vba_string(),
            args[2].to_vba_string(),
        )
    } else {
        (1, args[0].to_vba_string(), args[1].to_vba_string())
    };
    let hay: Vec<char> = haystack.chars().collect();
    if start > hay.len() + 1 {
        return Ok(Value::Number(0.0));
    }
    let tail: String = hay[start - 1..].iter().collect();
    match tail.find(&needle) {
        Some(byte_pos) => {
            let char_pos = tail[..byte_pos].chars().count();
            Ok(Value::Number((start + char_pos) as f64))
        }
        None => Ok(Value::Number(0.0)),
    }
}

fn builtin_instrrev(args: &[Value]) -> Result<Value, VbaError> {
    need("InStrRev", args, 2, 3)?;
    let haystack = args[0].to_vba_string();
    let needle = args[1].to_vba_string();
    match haystack.rfind(&needle) {
        Some(byte_pos) => {
            let char_pos = haystack[..byte_pos].chars().count();
            Ok(Value::Number((char_pos + 1) as f64))
        }
        None => Ok(Value::Number(0.0)),
    }
}

fn builtin_lcase(args: &[Value]) -> Result<Value, VbaError> {
    need("LCase", args, 1, 1)?;
    Ok(Value::String(args[0].to_vba_string().to_lowercase()))
}

fn builtin_ucase(args: &[Value]) -> Result<Value, VbaError> {
    need("UCase", args, 1, 1)?;
    Ok(Value::String(args[0].to_vba_string().to_uppercase()))
}

fn builtin_trim(args: &[Value]) -> Result<Value, VbaError> {
    need("Trim", args, 1, 1)?;
    Ok(Value::String(args[0].to_vba_string().trim().to_string()))
}

fn builtin_ltrim(args: &[Value]) -> Result<Value, VbaError> {
    need("LTrim", args, 1, 1)?;
    Ok(Value::String(args[0].to_vba_string().trim_start().to_string()))
}

fn builtin_rtrim(args: &[Value]) -> Result<Value, VbaError> {
    need("RTrim", args, 1, 1)?;
    Ok(Value::String(args[0].to_vba_string().trim_end().to_string()))
}

fn builtin_replace(args: &[Value]) -> Result<Value, VbaError> {
    need("Replace", args, 3, 5)?;
    let text = args[0].to_vba_string();
    let find = args[1].to_vba_string();
    let with = args[2].to_vba_string();
    if find.is_empty() {
        return Ok(Value::String(text));
    }
    Ok(Value::String(text.replace(&find, &with)))
}

fn builtin_space(args: &[Value]) -> Result<Value, VbaError> {
    need("Space", args, 1, 1)?;
    Ok(Value::String(" ".repeat(args[0].to_long().max(0) as usize)))
}

fn builtin_string(args: &[Value]) -> Result<Value, VbaError> {
    need("String", args, 2, 2)?;
    let count = args[0].to_long().max(0) as usize;
    let ch = match &args[1] {
        Value::String(s) => s.chars().next().unwrap_or(' '),
        other => char::from_u32(other.to_long().clamp(0, 0x10FFFF) as u32).unwrap_or(' '),
    };
    Ok(Value::String(ch.to_string().repeat(count)))
}

fn builtin_chr(args: &[Value]) -> Result<Value, VbaError> {
    need("Chr", args, 1, 1)?;
    let code = args[0].to_long();
    let ch = char::from_u32(code.clamp(0, 0x10FFFF) as u32)
        .ok_or_else(|| VbaError::InvalidProcedureCall("Chr".to_string()))?;
    Ok(Value::String(ch.to_string()))
}

fn builtin_asc(args: &[Value]) -> Result<Value, VbaError> {
    need("Asc", args, 1, 1)?;
    let s = args[0].to_vba_string();
    match s.chars().next() {
        Some(ch) => Ok(Value::Number(ch as u32 as f64)),
        None => Err(VbaError::InvalidProcedureCall("Asc".to_string())),
    }
}

fn builtin_strreverse(args: &[Value]) -> Result<Value, VbaError> {
    need("StrReverse", args, 1, 1)?;
    Ok(Value::String(args[0].to_vba_string().chars().rev().collect()))
}

fn builtin_split(args: &[Value]) -> Result<Value, VbaError> {
    need("Split", args, 1, 2)?;
    let text = args[0].to_vba_string();
    let delim = args
        .get(1)
        .map(|d| d.to_vba_string())
        .unwrap_or_else(|| " ".to_string());
    if delim.is_empty() {
        return Ok(Value::Array(vec![Value::String(text)]));
    }
    Ok(Value::Array(
        text.split(&delim).map(|p| Value::from(p)).collect(),
    ))
}

fn builtin_join(args: &[Value]) -> Result<Value, VbaError> {
    need("Join", args, 1, 2)?;
    let Value::Array(items) = &args[0] else {
        return Err(VbaError::TypeMismatch);
    };
    let delim = args
        .get(1)
        .map(|d| d.to_vba_string())
        .unwrap_or_else(|| " ".to_string());
    let parts: Vec<String> = items.iter().map(|v| v.to_vba_string()).collect();
    Ok(Value::String(parts.join(&delim)))
}

// ----- conversion and classification --------------------------------

fn builtin_cbool(args: &[Value]) -> Result<Value, VbaError> {
    need("CBool", args, 1, 1)?;
    Ok(Value::Boolean(args[0].to_boolean()))
}

fn rounded_clamped(name: &str, value: &Value, min: f64, max: f64) -> Result<f64, VbaError> {
    let n = value.to_number();
    if n.is_nan() {
        return Err(VbaError::TypeMismatch);
    }
    let rounded = round_half_even(n);
    if rounded < min || rounded > max {
        return Err(VbaError::Overflow);
    }
    let _ = name;
    Ok(rounded)
}

fn builtin_cbyte(args: &[Value]) -> Result<Value, VbaError> {
    need("CByte", args, 1, 1)?;
    Ok(Value::Number(rounded_clamped("CByte", &args[0], 0.0, 255.0)?))
}

fn builtin_cint(args: &[Value]) -> Result<Value, VbaError> {
    need("CInt", args, 1, 1)?;
    Ok(Value::Number(rounded_clamped(
        "CInt",
        &args[0],
        i16::MIN as f64,
        i16::MAX as f64,
    )?))
}

fn builtin_clng(args: &[Value]) -> Result<Value, VbaError> {
    need("CLng", args, 1, 1)?;
    Ok(Value::Number(rounded_clamped(
        "CLng",
        &args[0],
        i32::MIN as f64,
        i32::MAX as f64,
    )?))
}

fn builtin_cdbl(args: &[Value]) -> Result<Value, VbaError> {
    need("CDbl", args, 1, 1)?;
    let n = args[0].to_number();
    if n.is_nan() && !matches!(args[0], Value::Number(_)) {
        return Err(VbaError::TypeMismatch);
    }
    Ok(Value::Number(n))
}

fn builtin_cstr(args: &[Value]) -> Result<Value, VbaError> {
    need("CStr", args, 1, 1)?;
    Ok(Value::String(args[0].to_vba_string()))
}

fn builtin_cdate(args: &[Value]) -> Result<Value, VbaError> {
    need("CDate", args, 1, 1)?;
    Ok(Value::Date(to_date_days(&args[0])?))
}

fn builtin_cvar(args: &[Value]) -> Result<Value, VbaError> {
    need("CVar", args, 1, 1)?;
    Ok(args[0].clone())
}

fn builtin_isnull(args: &[Value]) -> Result<Value, VbaError> {
    need("IsNull", args, 1, 1)?;
    // Null folds into Empty in this value model.
    Ok(Value::Boolean(false))
}

fn builtin_isempty(args: &[Value]) -> Result<Value, VbaError> {
    need("IsEmpty", args, 1, 1)?;
    Ok(Value::Boolean(matches!(args[0], Value::Empty)))
}

fn builtin_isnothing(args: &[Value]) -> Result<Value, VbaError> {
    need("IsNothing", args, 1, 1)?;
    Ok(Value::Boolean(matches!(args[0], Value::Nothing)))
}

fn builtin_isarray(args: &[Value]) -> Result<Value, VbaError> {
    need("IsArray", args, 1, 1)?;
    Ok(Value::Boolean(matches!(args[0], Value::Array(_))))
}

fn builtin_isdate(args: &[Value]) -> Result<Value, VbaError> {
    need("IsDate", args, 1, 1)?;
    let ok = match &args[0] {
        Value::Date(_) => true,
        Value::String(s) => parse_date_text(s).is_some(),
        _ => false,
    };
    Ok(Value::Boolean(ok))
}

fn builtin_isnumeric(args: &[Value]) -> Result<Value, VbaError> {
    need("IsNumeric", args, 1, 1)?;
    let ok = match &args[0] {
        Value::Number(_) | Value::Boolean(_) | Value::Empty => true,
        Value::String(s) => !s.trim().is_empty() && s.trim().parse::<f64>().is_ok(),
        _ => false,
    };
    Ok(Value::Boolean(ok))
}

fn builtin_isobject(args: &[Value]) -> Result<Value, VbaError> {
    need("IsObject", args, 1, 1)?;
    Ok(Value::Boolean(matches!(
        args[0],
        Value::Object(_) | Value::Nothing
    )))
}

fn builtin_typename(args: &[Value]) -> Result<Value, VbaError> {
    need("TypeName", args, 1, 1)?;
    Ok(Value::String(args[0].type_name()))
}

fn builtin_vartype(args: &[Value]) -> Result<Value, VbaError> {
    need("VarType", args, 1, 1)?;
    let code = match &args[0] {
        Value::Empty => 0,
        Value::Number(_) => 5,
        Value::Date(_) => 7,
        Value::String(_) => 8,
        Value::Nothing | Value::Object(_) => 9,
        Value::Boolean(_) => 11,
        // vbArray + vbVariant.
        Value::Array(_) => 8204,
    };
    Ok(Value::Number(code as f64))
}

// ----- date and time -------------------------------------------------

fn builtin_now(args: &[Value]) -> Result<Value, VbaError> {
    need("Now", args, 0, 0)?;
    Ok(Value::Date(datetime_to_ole(chrono::Local::now().naive_local())))
}

fn builtin_date(args: &[Value]) -> Result<Value, VbaError> {
    need("Date", args, 0, 0)?;
    let now = datetime_to_ole(chrono::Local::now().naive_local());
    Ok(Value::Date(now.floor()))
}

fn builtin_time(args: &[Value]) -> Result<Value, VbaError> {
    need("Time", args, 0, 0)?;
    let now = datetime_to_ole(chrono::Local::now().naive_local());
    Ok(Value::Date(now - now.floor()))
}

fn builtin_year(args: &[Value]) -> Result<Value, VbaError> {
    date_part("Year", args, |dt| dt.year() as f64)
}

fn builtin_month(args: &[Value]) -> Result<Value, VbaError> {
    date_part("Month", args, |dt| dt.month() as f64)
}

fn builtin_day(args: &[Value]) -> Result<Value, VbaError> {
    date_part("Day", args, |dt| dt.day() as f64)
}

fn builtin_hour(args: &[Value]) -> Result<Value, VbaError> {
    date_part("Hour", args, |dt| dt.hour() as f64)
}

fn builtin_minute(args: &[Value]) -> Result<Value, VbaError> {
    date_part("Minute", args, |dt| dt.minute() as f64)
}

fn builtin_second(args: &[Value]) -> Result<Value, VbaError> {
    date_part("Second", args, |dt| dt.second() as f64)
}

fn builtin_weekday(args: &[Value]) -> Result<Value, VbaError> {
    need("Weekday", args, 1, 2)?;
    let days = to_date_days(&args[0])?;
    let dt = ole_to_datetime(days).ok_or(VbaError::TypeMismatch)?;
    // 1 = Sunday through 7 = Saturday.
    Ok(Value::Number(
        dt.weekday().num_days_from_sunday() as f64 + 1.0,
    ))
}

fn builtin_dateserial(args: &[Value]) -> Result<Value, VbaError> {
    need("DateSerial", args, 3, 3)?;
    let year = args[0].to_long();
    let month = args[1].to_long();
    let day = args[2].to_long();
    // Out-of-range month and day values roll over, as the legacy does.
    let base = chrono::NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or(VbaError::TypeMismatch)?
        .and_hms_opt(0, 0, 0)
        .ok_or(VbaError::TypeMismatch)?;
    let with_month = add_months(base, month - 1).ok_or(VbaError::TypeMismatch)?;
    let serial = with_month + chrono::Duration::days(i64::from(day) - 1);
    Ok(Value::Date(datetime_to_ole(serial)))
}

fn builtin_timeserial(args: &[Value]) -> Result<Value, VbaError> {
    need("TimeSerial", args, 3, 3)?;
    let hours = f64::from(args[0].to_long());
    let minutes = f64::from(args[1].to_long());
    let seconds = f64::from(args[2].to_long());
    Ok(Value::Date(
        hours / 24.0 + minutes / 1_440.0 + seconds / 86_400.0,
    ))
}

fn add_months(dt: chrono::NaiveDateTime, delta: i32) -> Option<chrono::NaiveDateTime> {
    let total = dt.year() * 12 + dt.month0() as i32 + delta;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let mut day = dt.day();
    loop {
        if let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date.and_time(dt.time()));
        }
        if day == 1 {
            return None;
        }
        day -= 1;
    }
}

fn builtin_dateadd(args: &[Value]) -> Result<Value, VbaError> {
    need("DateAdd", args, 3, 3)?;
    let interval = args[0].to_vba_string().to_lowercase();
    let count = args[1].to_long();
    let days = to_date_days(&args[2])?;
    let dt = ole_to_datetime(days).ok_or(VbaError::TypeMismatch)?;

    let result = match interval.as_str() {
        "yyyy" => add_months(dt, count * 12),
        "q" => add_months(dt, count * 3),
        "m" => add_months(dt, count),
        "y" | "d" | "w" => dt.checked_add_signed(chrono::Duration::days(i64::from(count))),
        "ww" => dt.checked_add_signed(chrono::Duration::days(i64::from(count) * 7)),
        "h" => dt.checked_add_signed(chrono::Duration::hours(i64::from(count))),
        "n" => dt.checked_add_signed(chrono::Duration::minutes(i64::from(count))),
        "s" => dt.checked_add_signed(chrono::Duration::seconds(i64::from(count))),
        _ => return Err(VbaError::InvalidProcedureCall("DateAdd".to_string())),
    };
    result
        .map(|dt| Value::Date(datetime_to_ole(dt)))
        .ok_or(VbaError::Overflow)
}

fn builtin_datediff(args: &[Value]) -> Result<Value, VbaError> {
    need("DateDiff", args, 3, 3)?;
    let interval = args[0].to_vba_string().to_lowercase();
    let first = to_date_days(&args[1])?;
    let second = to_date_days(&args[2])?;
    let from = ole_to_datetime(first).ok_or(VbaError::TypeMismatch)?;
    let to = ole_to_datetime(second).ok_or(VbaError::TypeMismatch)?;

    let result = match interval.as_str() {
        "yyyy" => f64::from(to.year() - from.year()),
        "q" => f64::from((to.year() * 4 + to.month0() as i32 / 3)
            - (from.year() * 4 + from.month0() as i32 / 3)),
        "m" => f64::from((to.year() * 12 + to.month0() as i32)
            - (from.year() * 12 + from.month0() as i32)),
        "y" | "d" | "w" => second.floor() - first.floor(),
        "ww" => ((second.floor() - first.floor()) / 7.0).trunc(),
        "h" => ((second - first) * 24.0).trunc(),
        "n" => ((second - first) * 1_440.0).trunc(),
        "s" => ((second - first) * 86_400.0).round(),
        _ => return Err(VbaError::InvalidProcedureCall("DateDiff".to_string())),
    };
    Ok(Value::Number(result))
}

// ----- array ---------------------------------------------------------

fn builtin_array(args: &[Value]) -> Result<Value, VbaError> {
    Ok(Value::Array(args.to_vec()))
}

fn builtin_lbound(args: &[Value]) -> Result<Value, VbaError> {
    need("LBound", args, 1, 2)?;
    match &args[0] {
        Value::Array(_) => Ok(Value::Number(0.0)),
        _ => Err(VbaError::TypeMismatch),
    }
}

fn builtin_ubound(args: &[Value]) -> Result<Value, VbaError> {
    need("UBound", args, 1, 2)?;
    match &args[0] {
        Value::Array(items) => Ok(Value::Number(items.len() as f64 - 1.0)),
        _ => Err(VbaError::TypeMismatch),
    }
}

// ----- utility -------------------------------------------------------

fn builtin_iif(args: &[Value]) -> Result<Value, VbaError> {
    need("IIf", args, 3, 3)?;
    if args[0].to_boolean() {
        Ok(args[1].clone())
    } else {
        Ok(args[2].clone())
    }
}

fn builtin_choose(args: &[Value]) -> Result<Value, VbaError> {
    need("Choose", args, 2, usize::MAX)?;
    let index = args[0].to_long();
    if index < 1 || index as usize > args.len() - 1 {
        return Ok(Value::Empty);
    }
    Ok(args[index as usize].clone())
}

fn builtin_switch(args: &[Value]) -> Result<Value, VbaError> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(VbaError::InvalidProcedureCall("Switch".to_string()));
    }
    for pair in args.chunks(2) {
        if pair[0].to_boolean() {
            return Ok(pair[1].clone());
        }
    }
    Ok(Value::Empty)
}

fn builtin_format(args: &[Value]) -> Result<Value, VbaError> {
    need("Format", args, 1, 2)?;
    let pattern = args.get(1).map(|p| p.to_vba_string()).unwrap_or_default();
    Ok(Value::String(format_value(&args[0], &pattern)))
}

fn format_value(value: &Value, pattern: &str) -> String {
    if pattern.is_empty() {
        return value.to_vba_string();
    }
    match pattern.to_lowercase().as_str() {
        "percent" => return format_numeric(value.to_number() * 100.0, 2, false) + "%",
        "short date" => {
            if let Ok(days) = to_date_days(value) {
                return Value::Date(days.floor()).to_vba_string();
            }
        }
        "long date" => {
            if let Some(dt) = to_date_days(value).ok().and_then(ole_to_datetime) {
                return dt.format("%A, %B %d, %Y").to_string();
            }
        }
        _ => {}
    }
    if looks_like_date_pattern(pattern) {
        if let Some(dt) = to_date_days(value).ok().and_then(ole_to_datetime) {
            return dt.format(&date_pattern_to_chrono(pattern)).to_string();
        }
    }
    if pattern.contains('0') || pattern.contains('#') {
        let decimals = pattern
            .split('.')
            .nth(1)
            .map(|tail| tail.chars().filter(|c| *c == '0' || *c == '#').count())
            .unwrap_or(0);
        return format_numeric(value.to_number(), decimals, pattern.contains(','));
    }
    value.to_vba_string()
}

fn looks_like_date_pattern(pattern: &str) -> bool {
    let lower = pattern.to_lowercase();
    ["yyyy", "yy", "mmm", "dd", "hh", "nn", "ss"]
        .iter()
        .any(|token| lower.contains(token))
        || (lower.contains("mm") && lower.contains('d'))
}

/// Translate the legacy date tokens to chrono format specifiers, longest
/// token first.
fn date_pattern_to_chrono(pattern: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = pattern.to_lowercase().chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let run: String = chars[i..].iter().take_while(|c| **c == chars[i]).collect();
        let (token, len) = match (chars[i], run.len()) {
            ('y', n) if n >= 4 => ("%Y", 4),
            ('y', _) => ("%y", 2.min(run.len())),
            ('m', n) if n >= 4 => ("%B", 4),
            ('m', 3) => ("%b", 3),
            ('m', n) => (if n >= 2 { "%m" } else { "%-m" }, n.min(2)),
            ('d', n) if n >= 4 => ("%A", 4),
            ('d', 3) => ("%a", 3),
            ('d', n) => (if n >= 2 { "%d" } else { "%-d" }, n.min(2)),
            ('h', n) => (if n >= 2 { "%H" } else { "%-H" }, n.min(2)),
            ('n', n) => (if n >= 2 { "%M" } else { "%-M" }, n.min(2)),
            ('s', n) => (if n >= 2 { "%S" } else { "%-S" }, n.min(2)),
            (other, _) => {
                if other == '%' {
                    out.push_str("%%");
                } else {
                    out.push(other);
                }
                i += 1;
                continue;
            }
        };
        out.push_str(token);
        i += len;
    }
    out
}

fn format_numeric(n: f64, decimals: usize, thousands: bool) -> String {
    let formatted = format!("{n:.decimals$}");
    if !thousands {
        return formatted;
    }
    let (sign, rest) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted.as_str()),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };
    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit);
    }
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

// ----- interaction stubs --------------------------------------------

fn builtin_msgbox(args: &[Value]) -> Result<Value, VbaError> {
    need("MsgBox", args, 1, 5)?;
    // Side-effect-free stub: always answers OK.
    Ok(Value::Number(1.0))
}

fn builtin_inputbox(args: &[Value]) -> Result<Value, VbaError> {
    need("InputBox", args, 1, 7)?;
    Ok(Value::from(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_even_matches_legacy_rounding() {
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(3.5), 4.0);
        assert_eq!(round_half_even(2.4), 2.0);
        assert_eq!(round_half_even(-2.5), -2.0);
    }

    #[test]
    fn format_numeric_groups_thousands() {
        assert_eq!(format_numeric(1234567.891, 2, true), "1,234,567.89");
        assert_eq!(format_numeric(-1234.0, 0, true), "-1,234");
        assert_eq!(format_numeric(12.0, 2, false), "12.00");
    }

    #[test]
    fn date_patterns_translate_to_chrono() {
        assert_eq!(date_pattern_to_chrono("yyyy-mm-dd"), "%Y-%m-%d");
        assert_eq!(date_pattern_to_chrono("hh:nn:ss"), "%H:%M:%S");
    }
}
