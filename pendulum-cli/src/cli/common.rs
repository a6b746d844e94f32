//! Common utilities shared across CLI commands.

/// The value following the flag at `flag_index`.
pub fn take_value<'a>(args: &'a [String], flag_index: usize, flag: &str) -> Result<&'a str, String> {
    args.get(flag_index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", flag))
}

/// The finite number following the flag at `flag_index`.
pub fn parse_number(args: &[String], flag_index: usize, flag: &str) -> Result<f64, String> {
    let raw = take_value(args, flag_index, flag)?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("{}: '{}' is not a finite number", flag, raw)),
    }
}

/// Wrap an index into `0..len` after moving by `delta`.
pub fn cycle(index: usize, delta: isize, len: usize) -> usize {
    (index as isize + delta).rem_euclid(len as isize) as usize
}
