/// Renders seconds as `m:ss`. Anything that is not a positive finite number
/// renders as `0:00`.
pub fn format_time(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "0:00".into();
    }
    let minutes = (secs / 60.0).floor() as u64;
    let seconds = (secs % 60.0).floor() as u64;
    format!("{minutes}:{seconds:02}")
}
