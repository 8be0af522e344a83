use std::time::Duration;

pub fn parse_duration_millis(s: &str) -> Result<Duration, String> {
    let millis: u64 = s.parse().map_err(|x| format!("{}: {}", s, x))?;
    Ok(Duration::from_millis(millis))
}
