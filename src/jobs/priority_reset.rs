use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::domain::context::RequestContext;
use crate::rpc::ads::AdsClient;

/// Periodically asks the ads service to drop expired priority boosts.
pub async fn run(ads: AdsClient, every: Duration, call_timeout: Duration) -> Result<()> {
    info!(interval_secs = every.as_secs(), "priority reset worker started");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep(&ads, call_timeout).await;
    }
}

/// One sweep. Failures are logged and retried on the next tick.
pub async fn sweep(ads: &AdsClient, call_timeout: Duration) -> Option<u64> {
    let ctx = RequestContext::generated(call_timeout);
    match ads.reset_expired_priorities(&ctx).await {
        Ok(affected) => {
            if affected > 0 {
                info!(affected, request_id = %ctx.request_id, "expired priorities reset");
            }
            Some(affected)
        }
        Err(err) => {
            warn!(error = %err, request_id = %ctx.request_id, "priority reset failed");
            None
        }
    }
}
