//! The demuxer orchestrator: one container parser per enabled
//! representation, packets interleaved by `(cur_seq_no, cur_timestamp)`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{
    clock::Clock,
    fetch::{Fetcher, HttpClient},
    manifest::{self, MediaKind, Presentation, ProgramMetadata, Rational, Representation},
    sequencer,
    stream::{SegmentReader, Session},
    DashError, DashOptions, DashResult,
};

/// Microseconds, the unit of [`DashStream::duration_us`].
pub const TIME_BASE: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Snap to the segment at or before the requested position.
    Backward,
    /// Snap forward.
    Forward,
}

/// One elementary packet as produced by an inner container parser.
#[derive(Debug, Clone)]
pub struct ParsedPacket {
    pub data: Bytes,
    /// Presentation timestamp in `time_base` units.
    pub pts: i64,
    pub time_base: Rational,
}

/// A demuxed packet with its segment-level side metadata.
#[derive(Debug, Clone)]
pub struct DashPacket {
    pub data: Bytes,
    pub pts: i64,
    pub time_base: Rational,
    pub stream_index: usize,
    /// Sequence number of the segment the packet came from.
    pub seg_number: i64,
    /// Segment size in bytes, `-1` when unknown.
    pub seg_size: i64,
    pub frag_timescale: i64,
    /// Nominal fragment duration in `frag_timescale` ticks.
    pub frag_duration: i64,
}

#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub stream_index: usize,
    pub kind: MediaKind,
    pub id: Option<String>,
    pub language: Option<String>,
    pub variant_bitrate: i64,
    pub width: u32,
    pub height: u32,
    pub framerate: Rational,
}

/// An inner container parser (fMP4, MPEG-TS, ...) pulling bytes from the
/// representation's [`SegmentReader`].
#[async_trait]
pub trait ContainerParser: Send {
    /// Parse and return the next packet; `Ok(None)` is end of input.
    async fn read_packet(&mut self, io: &mut SegmentReader<'_>)
        -> DashResult<Option<ParsedPacket>>;

    /// Frame-level seek, used only for single-fragment VOD representations.
    async fn seek(
        &mut self,
        io: &mut SegmentReader<'_>,
        position_us: i64,
        direction: SeekDirection,
    ) -> DashResult<()> {
        let _ = (io, position_us, direction);
        Err(DashError::SeekNotSupported)
    }
}

/// Probes the first bytes of a representation's stream and constructs the
/// matching container parser.
#[async_trait]
pub trait ContainerParserFactory: Send + Sync {
    async fn open(&self, io: &mut SegmentReader<'_>) -> DashResult<Box<dyn ContainerParser>>;
}

pub struct DashStream {
    session: Session,
    videos: Vec<Representation>,
    audios: Vec<Representation>,
    subtitles: Vec<Representation>,
    metadata: ProgramMetadata,
    factory: Arc<dyn ContainerParserFactory>,
    duration_us: Option<i64>,
}

impl DashStream {
    /// Fetch and parse the manifest, then open one inner parser per
    /// representation of the active period.
    pub async fn open(
        manifest_url: Url,
        options: DashOptions,
        factory: Arc<dyn ContainerParserFactory>,
    ) -> DashResult<Self> {
        let client = HttpClient::new(&options)?;
        let (text, final_url) = manifest::fetch_manifest(&client, &manifest_url).await?;
        let mpd = dash_mpd::parse(&text)?;
        let presentation = Presentation::from_mpd(&mpd, &final_url, 0, 0)?;

        let mut clock = Clock::new();
        if presentation.info.is_live {
            if let Err(e) = clock.sync(&mpd.UTCTiming, &client).await {
                tracing::warn!(error = %e, "clock sync failed, falling back to the local clock");
            }
        }

        let duration_us =
            (!presentation.info.is_live).then(|| presentation.info.media_presentation_duration * TIME_BASE);

        let fetcher = Fetcher::new(client, &options);
        let mut stream = Self {
            session: Session {
                info: presentation.info,
                fetcher,
                options,
                manifest_url,
                clock,
            },
            videos: presentation.videos,
            audios: presentation.audios,
            subtitles: presentation.subtitles,
            metadata: presentation.metadata,
            factory,
            duration_us,
        };

        let Self {
            session,
            videos,
            audios,
            subtitles,
            factory,
            ..
        } = &mut stream;

        let now = session.clock.now_secs();
        let mut stream_index = 0;
        for list in [&mut *videos, &mut *audios, &mut *subtitles] {
            for rep in list.iter_mut() {
                rep.cur_seq_no = sequencer::calc_cur_seg_no(rep, &session.info, &session.options, now);
                if rep.last_seq_no == 0 {
                    rep.last_seq_no =
                        sequencer::calc_max_seg_no(rep, &session.info, &session.options, now);
                }
                rep.stream_index = stream_index;
                stream_index += 1;
            }
        }
        if stream_index == 0 {
            return Err(DashError::InvalidManifest(
                "manifest carries no usable representation".to_string(),
            ));
        }

        open_components(session, factory, videos).await?;
        open_components(session, factory, audios).await?;
        open_components(session, factory, subtitles).await?;

        Ok(stream)
    }

    pub fn is_live(&self) -> bool {
        self.session.info.is_live
    }

    /// Total duration in microseconds; `None` for live presentations, which
    /// are not seekable.
    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    pub fn metadata(&self) -> &ProgramMetadata {
        &self.metadata
    }

    pub fn streams(&self) -> Vec<StreamInfo> {
        self.representations()
            .map(|rep| StreamInfo {
                stream_index: rep.stream_index,
                kind: rep.kind,
                id: rep.id.clone(),
                language: rep.lang.clone(),
                variant_bitrate: rep.bandwidth,
                width: rep.width,
                height: rep.height,
                framerate: rep.framerate,
            })
            .collect()
    }

    /// Mark a stream as discarded; it is torn down on the next
    /// `read_packet` and re-enabled (with catch-up) when cleared.
    pub fn set_discard(&mut self, stream_index: usize, discard: bool) {
        for list in [&mut self.videos, &mut self.audios, &mut self.subtitles] {
            for rep in list.iter_mut() {
                if rep.stream_index == stream_index {
                    rep.discard = discard;
                }
            }
        }
    }

    /// Read the next packet in presentation order across all enabled
    /// representations; `Ok(None)` is end of stream.
    pub async fn read_packet(&mut self) -> DashResult<Option<DashPacket>> {
        self.recheck_discard_flags().await?;

        let Some((kind, index)) = self.select_representation() else {
            return Err(DashError::InvalidManifest(
                "no representation is enabled".to_string(),
            ));
        };

        loop {
            if self.session.options.interrupted() {
                return Err(DashError::Interrupted);
            }

            let Self {
                session,
                videos,
                audios,
                subtitles,
                factory,
                ..
            } = self;
            let rep = match kind {
                MediaKind::Video => &mut videos[index],
                MediaKind::Audio => &mut audios[index],
                MediaKind::Subtitle => &mut subtitles[index],
            };

            let mut parser = match rep.parser.take() {
                Some(parser) => parser,
                None => factory.open(&mut SegmentReader::new(session, rep)).await?,
            };
            let mut reader = SegmentReader::new(session, rep);
            let result = parser.read_packet(&mut reader).await;
            rep.parser = Some(parser);

            match result {
                Ok(Some(packet)) => {
                    rep.cur_timestamp = rescale_to_90k(packet.pts, packet.time_base);
                    rep.time_base = packet.time_base;
                    let frag_duration = match rep.timelines.first() {
                        Some(entry) => entry.duration,
                        None => rep.fragment_duration,
                    };
                    return Ok(Some(DashPacket {
                        stream_index: rep.stream_index,
                        seg_number: rep.cur_seq_no,
                        seg_size: rep.cur_seg.as_ref().map(|seg| seg.size).unwrap_or(-1),
                        frag_timescale: rep.fragment_timescale,
                        frag_duration,
                        data: packet.data,
                        pts: packet.pts,
                        time_base: packet.time_base,
                    }));
                }
                result => {
                    if rep.is_restart_needed {
                        // the byte stream crossed into a new segment; reset
                        // the parser onto a fresh init section + body
                        rep.cur_seg_offset = 0;
                        rep.init_read_offset = 0;
                        rep.input = None;
                        rep.parser = None;
                        let mut reader = SegmentReader::new(session, rep);
                        rep.parser = Some(factory.open(&mut reader).await?);
                        rep.is_restart_needed = false;
                        continue;
                    }
                    return result.map(|_| None);
                }
            }
        }
    }

    /// Seek every representation to `timestamp` (in the target stream's time
    /// base). VOD only; disabled representations get a dry-run seek.
    pub async fn seek(
        &mut self,
        stream_index: usize,
        timestamp: i64,
        direction: SeekDirection,
    ) -> DashResult<()> {
        if self.session.info.is_live {
            return Err(DashError::SeekNotSupported);
        }
        let time_base = self
            .representations()
            .find(|rep| rep.stream_index == stream_index)
            .map(|rep| rep.time_base)
            .ok_or_else(|| {
                DashError::InvalidManifest(format!("unknown stream index {stream_index}"))
            })?;
        let seek_pos_msec = timestamp_to_msec(timestamp, time_base, direction);

        let Self {
            session,
            videos,
            audios,
            subtitles,
            factory,
            ..
        } = self;
        for list in [&mut *videos, &mut *audios, &mut *subtitles] {
            for rep in list.iter_mut() {
                seek_representation(session, factory, rep, seek_pos_msec, direction).await?;
            }
        }
        Ok(())
    }

    /// Tear down all inner parsers, fetcher handles and buffers.
    pub fn close(&mut self) {
        for list in [&mut self.videos, &mut self.audios, &mut self.subtitles] {
            for rep in list.iter_mut() {
                rep.parser = None;
                rep.input = None;
                rep.cur_seg = None;
                rep.init_buf = Vec::new();
                rep.init_data_len = 0;
                rep.init_read_offset = 0;
                rep.init_loaded = false;
            }
        }
    }

    fn representations(&self) -> impl Iterator<Item = &Representation> {
        self.videos
            .iter()
            .chain(self.audios.iter())
            .chain(self.subtitles.iter())
    }

    async fn recheck_discard_flags(&mut self) -> DashResult<()> {
        let Self {
            session,
            videos,
            audios,
            subtitles,
            factory,
            ..
        } = self;

        let max_active_seq_no = videos
            .iter()
            .chain(audios.iter())
            .chain(subtitles.iter())
            .filter(|rep| rep.is_active())
            .map(|rep| rep.cur_seq_no)
            .max();

        for list in [&mut *videos, &mut *audios, &mut *subtitles] {
            for rep in list.iter_mut() {
                let needed = !rep.discard;
                if needed && rep.parser.is_none() {
                    rep.cur_seg_offset = 0;
                    rep.init_read_offset = 0;
                    rep.input = None;
                    // catch up to the representations that kept playing
                    if let Some(max_seq_no) = max_active_seq_no {
                        rep.cur_seq_no = rep.cur_seq_no.max(max_seq_no);
                    }
                    let mut reader = SegmentReader::new(session, rep);
                    rep.parser = Some(factory.open(&mut reader).await?);
                    tracing::info!(stream_index = rep.stream_index, "now receiving stream");
                } else if !needed && rep.parser.is_some() {
                    rep.parser = None;
                    rep.input = None;
                    tracing::info!(stream_index = rep.stream_index, "no longer receiving stream");
                }
            }
        }
        Ok(())
    }

    fn select_representation(&self) -> Option<(MediaKind, usize)> {
        let mut best: Option<(MediaKind, usize, i64, i64)> = None;
        for (kind, list) in [
            (MediaKind::Video, &self.videos),
            (MediaKind::Audio, &self.audios),
            (MediaKind::Subtitle, &self.subtitles),
        ] {
            for (index, rep) in list.iter().enumerate() {
                if !rep.is_active() {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((_, _, seq_no, timestamp)) => {
                        rep.cur_seq_no < *seq_no
                            || (rep.cur_seq_no == *seq_no && rep.cur_timestamp < *timestamp)
                    }
                };
                if better {
                    best = Some((kind, index, rep.cur_seq_no, rep.cur_timestamp));
                }
            }
        }
        best.map(|(kind, index, _, _)| (kind, index))
    }
}

impl Drop for DashStream {
    fn drop(&mut self) {
        self.close();
    }
}

async fn open_components(
    session: &mut Session,
    factory: &Arc<dyn ContainerParserFactory>,
    list: &mut [Representation],
) -> DashResult<()> {
    let common_init = common_init_section(list);
    for index in 0..list.len() {
        if index > 0 && common_init {
            let (first, rest) = list.split_at_mut(1);
            copy_init_section(&mut rest[index - 1], &first[0]);
        }
        let rep = &mut list[index];
        let mut reader = SegmentReader::new(session, rep);
        rep.parser = Some(factory.open(&mut reader).await?);
    }
    Ok(())
}

/// Representations of one kind share an init section when every declared
/// `Initialization` has the same URL, offset and size.
fn common_init_section(list: &[Representation]) -> bool {
    let Some(first) = list.first().and_then(|rep| rep.init_section.as_ref()) else {
        return false;
    };
    list.iter().all(|rep| rep.init_section.as_ref() == Some(first))
}

fn copy_init_section(dest: &mut Representation, src: &Representation) {
    if !src.init_loaded {
        return;
    }
    dest.init_buf = src.init_buf.clone();
    dest.init_data_len = src.init_data_len;
    dest.init_read_offset = 0;
    dest.init_loaded = true;
    dest.cur_timestamp = src.cur_timestamp;
}

async fn seek_representation(
    session: &mut Session,
    factory: &Arc<dyn ContainerParserFactory>,
    rep: &mut Representation,
    seek_pos_msec: i64,
    direction: SeekDirection,
) -> DashResult<()> {
    let dry_run = rep.parser.is_none();
    tracing::debug!(
        stream_index = rep.stream_index,
        seek_pos_msec,
        dry_run,
        "seeking representation"
    );

    // single fragment mode: the inner parser seeks frame-accurately
    if rep.fragments.len() == 1 {
        rep.cur_timestamp = 0;
        rep.cur_seg_offset = 0;
        if dry_run {
            return Ok(());
        }
        let Some(mut parser) = rep.parser.take() else {
            return Ok(());
        };
        let mut reader = SegmentReader::new(session, rep);
        let result = parser
            .seek(&mut reader, seek_pos_msec * 1000, direction)
            .await;
        rep.parser = Some(parser);
        return result;
    }

    rep.input = None;

    if !rep.timelines.is_empty() && rep.fragment_timescale > 0 {
        let seq_no = sequencer::seq_no_for_position_msec(rep, seek_pos_msec);
        rep.cur_seq_no = seq_no.min(rep.last_seq_no);
    } else if rep.fragment_duration > 0 {
        rep.cur_seq_no = rep.first_seq_no
            + (seek_pos_msec * rep.fragment_timescale / rep.fragment_duration) / 1000;
    } else {
        tracing::error!(
            stream_index = rep.stream_index,
            "seek without timeline or fragment duration"
        );
        rep.cur_seq_no = rep.first_seq_no;
    }

    rep.cur_timestamp = 0;
    rep.cur_seg_offset = 0;
    rep.init_read_offset = 0;

    if !dry_run {
        rep.parser = None;
        let mut reader = SegmentReader::new(session, rep);
        rep.parser = Some(factory.open(&mut reader).await?);
    }
    Ok(())
}

/// Rescale a presentation timestamp to 90 kHz ticks.
fn rescale_to_90k(pts: i64, time_base: Rational) -> i64 {
    if time_base.den == 0 {
        return 0;
    }
    (pts as i128 * time_base.num as i128 * 90_000 / time_base.den as i128) as i64
}

/// Convert a timestamp in `time_base` units to milliseconds, rounding in the
/// seek direction.
fn timestamp_to_msec(timestamp: i64, time_base: Rational, direction: SeekDirection) -> i64 {
    if time_base.den == 0 {
        return timestamp;
    }
    let num = timestamp as i128 * time_base.num as i128 * 1000;
    let den = time_base.den as i128;
    let msec = match direction {
        SeekDirection::Backward => num.div_euclid(den),
        SeekDirection::Forward => (num + den - 1).div_euclid(den),
    };
    msec as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_to_90k() {
        // 1 second in a 1/1000 time base is 90000 ticks
        assert_eq!(rescale_to_90k(1000, Rational::new(1, 1000)), 90_000);
        // 1 frame at 25 fps in a 1/25 base is 3600 ticks
        assert_eq!(rescale_to_90k(1, Rational::new(1, 25)), 3_600);
        assert_eq!(rescale_to_90k(42, Rational::new(1, 0)), 0);
    }

    #[test]
    fn test_timestamp_to_msec_rounding() {
        let tb = Rational::new(1, 90_000);
        // 90001 ticks is 1000.011ms
        assert_eq!(
            timestamp_to_msec(90_001, tb, SeekDirection::Backward),
            1000
        );
        assert_eq!(timestamp_to_msec(90_001, tb, SeekDirection::Forward), 1001);
        assert_eq!(
            timestamp_to_msec(90_000, tb, SeekDirection::Forward),
            1000
        );
    }
}
