//! Streamed archive transfer with size probing and decile progress.

use std::io::Write as _;
use std::time::Duration;

use futures::StreamExt as _;

use crate::WdsError;

/// Timeout for the metadata-only size probe.
const HEAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the full archive transfer.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Progress is logged at most once per crossed decile.
const PROGRESS_INTERVAL_PCT: u32 = 10;

/// Probes a URL's declared content length without transferring the body.
///
/// A missing or unparseable `Content-Length` header yields 0 — the
/// pre-transfer ceiling then can't reject the download, but the accurate
/// post-extraction check still applies.
///
/// # Errors
///
/// Returns [`WdsError::Http`] on transport or non-2xx failures.
pub async fn probe_content_length(http: &reqwest::Client, url: &str) -> Result<u64, WdsError> {
    let resp = http
        .head(url)
        .timeout(HEAD_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    Ok(resp
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0))
}

/// Streams a URL's body to an open file in chunks, logging progress at
/// decile crossings. `total` is the declared length from the probe (0 when
/// unknown, which disables progress lines).
///
/// # Errors
///
/// Returns [`WdsError::Http`] on transport or non-2xx failures and
/// [`WdsError::Io`] on write failures.
pub async fn stream_to_file(
    http: &reqwest::Client,
    url: &str,
    dest: &mut std::fs::File,
    total: u64,
    label: &str,
) -> Result<(), WdsError> {
    let resp = http
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let mut stream = resp.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_pct: u32 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        dest.write_all(&chunk)?;
        downloaded += chunk.len() as u64;

        let pct = progress_pct(downloaded, total);
        if crossed_decile(pct, last_pct) {
            log::info!(
                "{label} - Downloading {}/{}MB ({pct}%)",
                downloaded / 1_000_000,
                total / 1_000_000,
            );
            last_pct = pct;
        }
    }

    dest.flush()?;
    Ok(())
}

/// Transfer progress as a whole percentage, clamped to 100. Unknown
/// totals report 0.
#[must_use]
pub const fn progress_pct(downloaded: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = downloaded.saturating_mul(100) / total;
    if pct > 100 { 100 } else { pct as u32 }
}

/// Whether progress advanced enough since the last log line: at least a
/// full decile, never on a decrease.
#[must_use]
pub const fn crossed_decile(pct: u32, last_pct: u32) -> bool {
    pct >= last_pct + PROGRESS_INTERVAL_PCT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pct_is_clamped_and_zero_safe() {
        assert_eq!(progress_pct(0, 100), 0);
        assert_eq!(progress_pct(50, 100), 50);
        assert_eq!(progress_pct(100, 100), 100);
        assert_eq!(progress_pct(150, 100), 100);
        assert_eq!(progress_pct(123, 0), 0);
    }

    #[test]
    fn logs_once_per_crossed_decile() {
        assert!(!crossed_decile(9, 0));
        assert!(crossed_decile(10, 0));
        assert!(!crossed_decile(19, 10));
        assert!(crossed_decile(20, 10));
        // A multi-decile jump logs once, then waits for the next decile.
        assert!(crossed_decile(55, 10));
        assert!(!crossed_decile(60, 55));
        assert!(crossed_decile(65, 55));
    }

    #[test]
    fn never_logs_on_decrease() {
        assert!(!crossed_decile(40, 50));
        assert!(!crossed_decile(0, 0));
    }
}
