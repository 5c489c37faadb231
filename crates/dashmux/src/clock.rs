use chrono::{DateTime, TimeDelta, Utc};
use dash_mpd::UTCTiming;

use crate::{fetch::HttpClient, DashError, DashResult};

/// Wall clock with an offset to the content provider's clock. Live segment
/// availability is computed against this, not the local clock.
#[derive(Debug)]
pub struct Clock {
    /// How much the local clock is behind the remote clock.
    offset: TimeDelta,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            offset: TimeDelta::zero(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_offset(offset: TimeDelta) -> Self {
        Self { offset }
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset
    }

    pub fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }

    fn set_time(
        &mut self,
        remote_now: DateTime<Utc>,
        before_request: DateTime<Utc>,
        after_request: DateTime<Utc>,
    ) {
        let rtt = (after_request - before_request) / 2;
        let server_now = remote_now + rtt / 2;
        self.offset = server_now - after_request;
        tracing::debug!(
            offset_milliseconds = %self.offset.num_milliseconds(),
            "clock synchronized to {remote_now}"
        );
    }

    /// Synchronize against the `UTCTiming` elements of the manifest. Falls
    /// back to the local clock when none is usable.
    pub async fn sync(&mut self, timing: &[UTCTiming], client: &HttpClient) -> DashResult<()> {
        if timing.is_empty() {
            return Ok(());
        }

        let mut last_error: Option<DashError> = None;
        let before_request = Utc::now();

        for timing in timing {
            match timing.schemeIdUri.as_deref().unwrap_or("") {
                "urn:mpeg:dash:utc:http-xsdate:2014" | "urn:mpeg:dash:utc:http-iso:2014" => {
                    let Some(url) = &timing.value else {
                        last_error = Some(DashError::InvalidTimingScheme(
                            "missing value for http-xsdate scheme".to_string(),
                        ));
                        continue;
                    };
                    match fetch_remote_time(client, url, before_request).await {
                        Ok((datetime, after_request)) => {
                            self.set_time(datetime, before_request, after_request);
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::warn!(url = %url, error = %e, "time sync request failed");
                            last_error = Some(e);
                        }
                    }
                }
                "urn:mpeg:dash:utc:direct:2014" => {
                    let Some(value) = &timing.value else {
                        last_error = Some(DashError::InvalidTimingScheme(
                            "missing value for direct scheme".to_string(),
                        ));
                        continue;
                    };
                    match parse_xsdate(value) {
                        Ok(datetime) => {
                            self.set_time(datetime, before_request, before_request);
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::warn!(value = %value, error = %e, "invalid direct timing value");
                            last_error = Some(e);
                        }
                    }
                }
                other => {
                    tracing::warn!(scheme = %other, "unsupported timing scheme");
                    last_error = Some(DashError::InvalidTimingScheme(other.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DashError::InvalidTimingScheme("all time sync methods failed".to_string())
        }))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_xsdate(text: &str) -> DashResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // xsdate servers commonly emit a bare Z suffix
            DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%SZ").map(|dt| dt.with_timezone(&Utc))
        })
        .map_err(|e| DashError::InvalidTimingScheme(format!("unparseable date-time: {e}")))
}

async fn fetch_remote_time(
    client: &HttpClient,
    url: &str,
    _before: DateTime<Utc>,
) -> DashResult<(DateTime<Utc>, DateTime<Utc>)> {
    let response = client.get(url).send().await?;
    let after_request = Utc::now();
    if !response.status().is_success() {
        return Err(DashError::HttpStatus(response.status()));
    }
    let text = response.text().await?;
    Ok((parse_xsdate(text.trim())?, after_request))
}
