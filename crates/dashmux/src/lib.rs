//! # MPEG-DASH demultiplexing
//!
//! This crate turns an MPD URL into a single stream of elementary media
//! packets, hiding the fact that the media is split across many segment
//! files and that, for live presentations, the set of available segments
//! evolves over time.
//!
//! ## VoD (static MPD)
//!
//! For static MPDs the content is fully described up front. Every
//! representation's segment index is derived once from its
//! `SegmentTemplate`, `SegmentTimeline` or `SegmentList`, and the
//! presentation is seekable.
//!
//! ## Live (dynamic MPD)
//!
//! For dynamic MPDs the manifest is re-fetched whenever a representation
//! runs past its known window (or falls out of the time-shift buffer), and
//! the refreshed timeline is spliced in without losing the current read
//! position. The wall clock is synchronized against `UTCTiming` sources so
//! segment availability is computed on the provider's clock.
//!
//! ## Structure
//!
//! * [`DashStream`] — the demuxer: open a manifest, read interleaved
//!   packets, seek, toggle streams on and off.
//! * [`ContainerParser`] / [`ContainerParserFactory`] — the seam to the
//!   inner fMP4/TS parsers; they consume the byte stream of
//!   [`SegmentReader`], which splices the initialization section in front
//!   of each segment's body bytes.
//! * [`sequencer`] — the segment-number arithmetic for the three
//!   addressing styles.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # async fn run(factory: Arc<dyn dashmux::ContainerParserFactory>) -> dashmux::DashResult<()> {
//! use dashmux::{DashOptions, DashStream};
//!
//! let url = url::Url::parse("https://example.com/live/manifest.mpd").unwrap();
//! let mut stream = DashStream::open(url, DashOptions::default(), factory).await?;
//! while let Some(packet) = stream.read_packet().await? {
//!     println!("stream {} pts {}", packet.stream_index, packet.pts);
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod demux;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod options;
pub mod refresh;
pub mod sequencer;
pub mod stream;
mod baseurl;
mod template;

pub use crate::{
    demux::{
        ContainerParser, ContainerParserFactory, DashPacket, DashStream, ParsedPacket,
        SeekDirection, StreamInfo, TIME_BASE,
    },
    error::{DashError, DashResult},
    manifest::{
        probe, Fragment, MediaKind, Presentation, PresentationInfo, ProgramMetadata, Rational,
        Representation, TimelineEntry,
    },
    options::{DashOptions, InterruptCallback},
    stream::{SegmentReader, Session},
};
