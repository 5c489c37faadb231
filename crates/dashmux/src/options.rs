use std::{sync::Arc, time::Duration};

/// Callback polled inside retry loops; returning `true` aborts the operation
/// with [`DashError::Interrupted`](crate::DashError::Interrupted).
pub type InterruptCallback = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct DashOptions {
    /// File extensions the `file://` scheme is allowed to open. The literal
    /// `"ALL"` disables the check.
    pub allowed_extensions: String,

    /// Normalize timeline lookups by `first_seq_no`, for manifests that index
    /// `SegmentTimeline` entries from `startNumber` rather than from zero.
    /// Manifests in the wild vary; the default stays on.
    pub use_timeline_segment_offset_correction: bool,

    /// Never request the segment at the live head before the content
    /// provider has finished writing it.
    pub fetch_completed_segments_only: bool,

    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub http_proxy: Option<String>,
    pub headers: Vec<(String, String)>,

    /// Per-request read/write timeout on the transport.
    pub request_timeout: Duration,

    pub interrupt: Option<InterruptCallback>,
}

impl Default for DashOptions {
    fn default() -> Self {
        Self {
            allowed_extensions: "aac,m4a,m4s,m4v,mov,mp4,webm,ts".to_string(),
            use_timeline_segment_offset_correction: true,
            fetch_completed_segments_only: true,
            user_agent: None,
            referer: None,
            http_proxy: None,
            headers: Vec::new(),
            request_timeout: Duration::from_secs(30),
            interrupt: None,
        }
    }
}

impl DashOptions {
    pub(crate) fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|cb| cb())
    }
}
