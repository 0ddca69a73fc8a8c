use anyhow::{Context, Result};

use crate::Endpoint;

pub fn check_endpoint(host: &str) -> Result<Endpoint> {
    let ep = Endpoint::parse(host).with_context(|| format!("link.host `{}`", host))?;
    Ok(ep)
}

pub fn check_telemetry_timing(stale_after_s: f64, tick_ms: u64) -> Result<()> {
    anyhow::ensure!(stale_after_s.is_finite() && stale_after_s > 0.0, "telemetry.stale_after_s must be > 0");
    anyhow::ensure!(tick_ms >= 50, "telemetry.tick_ms below 50ms just burns cpu");
    anyhow::ensure!(
        (tick_ms as f64) / 1000.0 <= stale_after_s,
        "telemetry.tick_ms ({}ms) longer than stale_after_s ({}s) delays stale detection",
        tick_ms,
        stale_after_s
    );
    Ok(())
}

pub fn check_remote_id_interval(interval_ms: u64) -> Result<()> {
    anyhow::ensure!(interval_ms > 0, "remote_id.interval_ms must be > 0");
    if interval_ms > 1000 {
        tracing::warn!("remote_id.interval_ms={} is slower than the 1 Hz broadcast rate", interval_ms);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_check() {
        assert_eq!(check_endpoint("drone.local:8000").unwrap().to_string(), "http://drone.local:8000");
        assert!(check_endpoint("").is_err());
    }

    #[test]
    fn timing_checks() {
        assert!(check_telemetry_timing(5.0, 1000).is_ok());
        assert!(check_telemetry_timing(0.0, 1000).is_err());
        assert!(check_telemetry_timing(5.0, 10).is_err());
        assert!(check_telemetry_timing(0.5, 1000).is_err());
        assert!(check_remote_id_interval(0).is_err());
        assert!(check_remote_id_interval(1000).is_ok());
    }
}
