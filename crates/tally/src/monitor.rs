// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally monitor` - periodic audit and health monitoring loop.
//!
//! Each iteration is a self-contained read-then-check pass: verify the
//! audit hash chains, then probe the configured health URLs. The loop is a
//! plain sleep-poll cycle; `monitor.iterations` bounds it for testing.

use std::time::Duration;

use tally_config::TallyConfig;
use tally_core::TallyError;
use tracing::{error, info, warn};

use crate::context::AppContext;

pub async fn run(config: &TallyConfig) -> Result<(), TallyError> {
    let ctx = AppContext::init(config).await?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| TallyError::Internal(format!("failed to build health client: {e}")))?;
    let interval = Duration::from_secs(config.monitor.interval_secs);

    let mut count = 0u64;
    loop {
        let intact = ctx.audit.verify_chain(None).await?;
        if !intact {
            error!("audit log verification failed");
            println!("Audit log verification failed");
        }

        for url in &config.monitor.health_urls {
            if !check_health(&client, url).await {
                warn!(url, "health check failed");
                println!("Health check failed for {url}");
            }
        }

        count += 1;
        if let Some(iterations) = config.monitor.iterations {
            if count >= iterations {
                break;
            }
        }
        info!(iteration = count, "monitor pass complete; sleeping");
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

/// `true` when `url` answers with a success status within the timeout.
async fn check_health(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
