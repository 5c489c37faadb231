//! The MPD data model the sequencer runs on, and its conversion from the
//! parsed XML document.
//!
//! The XML binding itself is `dash_mpd`; this module selects the active
//! Period, resolves BaseURL chains and flattens the three segment addressing
//! styles into [`Representation`] values.

use url::Url;

use crate::{
    baseurl::{document_base, merge_baseurls},
    demux::ContainerParser,
    fetch::HttpClient,
    template::Template,
    DashError, DashResult,
};

pub const MAX_MANIFEST_SIZE: usize = 50 * 1024;
pub const INITIAL_MANIFEST_SIZE: usize = 8 * 1024;

/// One byte range to fetch. `size == -1` means unknown; reads run to EOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub url: String,
    pub url_offset: i64,
    pub size: i64,
}

impl Fragment {
    pub fn new(url: String) -> Self {
        Self {
            url,
            url_offset: 0,
            size: -1,
        }
    }

    /// Apply a `mediaRange`/`range` attribute of the form `"start-end"`
    /// (inclusive end, per ISO/IEC 23009-1).
    pub fn with_range(url: String, range: Option<&str>) -> Self {
        let mut fragment = Self::new(url);
        if let Some((start, end)) = range.and_then(|r| r.split_once('-')) {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<i64>(), end.trim().parse::<i64>()) {
                fragment.url_offset = start;
                fragment.size = end - start + 1;
            }
        }
        fragment
    }
}

/// One `SegmentTimeline/S` element. A `start_time` of `0` means "contiguous
/// with the previous entry"; a positive value is an absolute override and
/// signals a timeline discontinuity. `repeat == -1` fills the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub start_time: i64,
    pub duration: i64,
    pub repeat: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Parse an MPD `@frameRate` ("30000/1001" or "25").
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once('/') {
            Some((num, den)) => Some(Self {
                num: num.trim().parse().ok()?,
                den: den.trim().parse().ok()?,
            }),
            None => Some(Self {
                num: s.trim().parse().ok()?,
                den: 1,
            }),
        }
    }
}

/// A single encoding of one media component, together with its play
/// position. The fragment/timeline arrays are replaced wholesale on live
/// refresh; the play position survives the splice.
pub struct Representation {
    pub id: Option<String>,
    pub kind: MediaKind,
    pub bandwidth: i64,
    pub lang: Option<String>,
    pub codecs: Option<String>,
    pub scan_type: Option<String>,
    pub width: u32,
    pub height: u32,
    pub framerate: Rational,

    /// Explicit fragment list (`SegmentList`, or a bare `BaseURL`).
    pub fragments: Vec<Fragment>,
    /// `SegmentTemplate@media` with BaseURLs applied,
    /// `$Number$`/`$Time$`/...  placeholders intact.
    pub url_template: Option<String>,
    pub timelines: Vec<TimelineEntry>,

    pub fragment_duration: i64,
    pub fragment_timescale: i64,
    pub presentation_timeoffset: i64,

    pub start_number: i64,
    pub first_seq_no: i64,
    pub last_seq_no: i64,
    pub cur_seq_no: i64,

    pub init_section: Option<Fragment>,
    pub(crate) init_buf: Vec<u8>,
    pub(crate) init_data_len: usize,
    pub(crate) init_read_offset: usize,
    pub(crate) init_loaded: bool,

    pub cur_seg: Option<Fragment>,
    pub(crate) cur_seg_offset: i64,
    pub(crate) cur_seg_size: i64,
    /// Position of the last delivered packet, in 90 kHz ticks.
    pub cur_timestamp: i64,
    pub is_restart_needed: bool,

    pub period_start: i64,
    pub period_duration: i64,
    pub period_media_presentation_duration: i64,

    pub stream_index: usize,
    pub discard: bool,
    pub(crate) time_base: Rational,
    pub(crate) input: Option<crate::fetch::ByteSource>,
    pub(crate) parser: Option<Box<dyn ContainerParser>>,
}

impl Representation {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            id: None,
            kind,
            bandwidth: 0,
            lang: None,
            codecs: None,
            scan_type: None,
            width: 0,
            height: 0,
            framerate: Rational::default(),
            fragments: Vec::new(),
            url_template: None,
            timelines: Vec::new(),
            fragment_duration: 0,
            fragment_timescale: 0,
            presentation_timeoffset: 0,
            start_number: 0,
            first_seq_no: 0,
            last_seq_no: 0,
            cur_seq_no: 0,
            init_section: None,
            init_buf: Vec::new(),
            init_data_len: 0,
            init_read_offset: 0,
            init_loaded: false,
            cur_seg: None,
            cur_seg_offset: 0,
            cur_seg_size: -1,
            cur_timestamp: 0,
            is_restart_needed: false,
            period_start: 0,
            period_duration: 0,
            period_media_presentation_duration: 0,
            stream_index: 0,
            discard: false,
            time_base: Rational::new(1, 1000),
            input: None,
            parser: None,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.parser.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresentationInfo {
    pub base_url: String,
    pub is_live: bool,

    /// MPD attributes, in seconds (UTC seconds for the absolute times).
    pub availability_start_time: i64,
    pub availability_end_time: i64,
    pub publish_time: i64,
    pub minimum_update_period: i64,
    pub time_shift_buffer_depth: i64,
    pub suggested_presentation_delay: i64,
    pub min_buffer_time: i64,
    pub media_presentation_duration: i64,

    /// Currently selected Period.
    pub period_start: i64,
    pub period_duration: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramMetadata {
    pub title: Option<String>,
    pub source: Option<String>,
    pub copyright: Option<String>,
}

pub struct Presentation {
    pub info: PresentationInfo,
    pub metadata: ProgramMetadata,
    pub videos: Vec<Representation>,
    pub audios: Vec<Representation>,
    pub subtitles: Vec<Representation>,
}

impl Presentation {
    /// Convert a parsed MPD into the demuxer's model, selecting the Period
    /// active at `curr_timepoint` seconds into the presentation.
    ///
    /// `prev_period_start` is the previously selected period start (0 on the
    /// first parse); the default-period rule never walks backwards past it.
    pub fn from_mpd(
        mpd: &dash_mpd::MPD,
        manifest_url: &Url,
        curr_timepoint: i64,
        prev_period_start: i64,
    ) -> DashResult<Presentation> {
        let Some(mpd_type) = mpd.mpdtype.as_deref() else {
            return Err(DashError::InvalidManifest(
                "missing MPD type attribute".to_string(),
            ));
        };

        let mut info = PresentationInfo {
            base_url: manifest_url.to_string(),
            is_live: mpd_type.eq_ignore_ascii_case("dynamic"),
            availability_start_time: mpd
                .availabilityStartTime
                .map(|t| t.timestamp())
                .unwrap_or(0),
            availability_end_time: mpd.availabilityEndTime.map(|t| t.timestamp()).unwrap_or(0),
            publish_time: mpd.publishTime.map(|t| t.timestamp()).unwrap_or(0),
            minimum_update_period: mpd
                .minimumUpdatePeriod
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            time_shift_buffer_depth: mpd
                .timeShiftBufferDepth
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            suggested_presentation_delay: mpd
                .suggestedPresentationDelay
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            min_buffer_time: mpd.minBufferTime.map(|d| d.as_secs() as i64).unwrap_or(0),
            media_presentation_duration: mpd
                .mediaPresentationDuration
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            period_start: prev_period_start,
            period_duration: 0,
        };

        let period_index = select_period(mpd, curr_timepoint, prev_period_start, &mut info)?;
        let period = &mpd.periods[period_index];

        let mut base_url = manifest_url.clone();
        if let Some(mpd_base) = mpd.base_url.first() {
            base_url = apply_base(&base_url, &mpd_base.base)?;
        }
        if let Some(period_base) = period.BaseURL.first() {
            base_url = apply_base(&base_url, &period_base.base)?;
        }

        let mut presentation = Presentation {
            info,
            metadata: program_metadata(mpd),
            videos: Vec::new(),
            audios: Vec::new(),
            subtitles: Vec::new(),
        };

        for adaptation in &period.adaptations {
            let adaptation_base = match adaptation.BaseURL.first() {
                Some(b) => apply_base(&base_url, &b.base)?,
                None => base_url.clone(),
            };
            for representation in &adaptation.representations {
                match representation_from_mpd(
                    &adaptation_base,
                    period,
                    adaptation,
                    representation,
                    &presentation.info,
                )? {
                    Some(rep) => match rep.kind {
                        MediaKind::Video => presentation.videos.push(rep),
                        MediaKind::Audio => presentation.audios.push(rep),
                        MediaKind::Subtitle => presentation.subtitles.push(rep),
                    },
                    None => {
                        tracing::debug!(
                            id = ?representation.id,
                            "skipping representation with unsupported media type"
                        );
                    }
                }
            }
        }

        Ok(presentation)
    }
}

fn apply_base(current: &Url, new: &str) -> DashResult<Url> {
    if new.is_empty() {
        // an empty BaseURL inherits the directory of the accumulated URL
        document_base(current)
    } else {
        merge_baseurls(current, new)
    }
}

/// Walk Periods in document order. The chosen Period is the one whose start
/// is <= `curr_timepoint` with the smallest non-negative gap; if none
/// matches, the latest Period whose start >= the previously selected period
/// start is the default.
fn select_period(
    mpd: &dash_mpd::MPD,
    curr_timepoint: i64,
    prev_period_start: i64,
    info: &mut PresentationInfo,
) -> DashResult<usize> {
    let mut matching: Option<usize> = None;
    let mut default: Option<usize> = None;
    let mut min_period_diff = i64::MAX;

    for (index, period) in mpd.periods.iter().enumerate() {
        let period_start = period.start.map(|d| d.as_secs() as i64).unwrap_or(0);
        let period_duration = period.duration.map(|d| d.as_secs() as i64).unwrap_or(0);

        tracing::debug!(
            period_start,
            period_duration,
            curr_timepoint,
            "considering period"
        );

        if matching.is_none() && period_start >= prev_period_start {
            info.period_duration = period_duration;
            info.period_start = period_start;
            default = Some(index);
            if info.period_start > 0 {
                info.media_presentation_duration = info.period_duration;
            }
        }

        let diff = curr_timepoint - period_start;
        if diff >= 0 && diff <= min_period_diff {
            min_period_diff = diff;
            info.period_duration = period_duration;
            info.period_start = period_start;
            matching = Some(index);
            if info.period_start > 0 {
                info.media_presentation_duration = info.period_duration;
            }
        }
    }

    matching.or(default).ok_or_else(|| {
        DashError::InvalidManifest("no suitable Period for current timepoint".to_string())
    })
}

fn program_metadata(mpd: &dash_mpd::MPD) -> ProgramMetadata {
    let Some(pi) = &mpd.ProgramInformation else {
        return ProgramMetadata::default();
    };
    ProgramMetadata {
        title: pi.Title.as_ref().and_then(|t| t.content.clone()),
        source: pi.Source.as_ref().and_then(|s| s.content.clone()),
        copyright: pi.Copyright.as_ref().and_then(|c| c.content.clone()),
    }
}

fn media_kind_of(content_type: Option<&str>, mime_type: Option<&str>) -> Option<MediaKind> {
    for value in [content_type, mime_type].into_iter().flatten() {
        let value = value.to_ascii_lowercase();
        if value.contains("video") {
            return Some(MediaKind::Video);
        } else if value.contains("audio") {
            return Some(MediaKind::Audio);
        } else if value.contains("text") {
            return Some(MediaKind::Subtitle);
        }
    }
    None
}

fn representation_from_mpd(
    base_url: &Url,
    period: &dash_mpd::Period,
    adaptation: &dash_mpd::AdaptationSet,
    representation: &dash_mpd::Representation,
    info: &PresentationInfo,
) -> DashResult<Option<Representation>> {
    // media class: Representation, then ContentComponent, then AdaptationSet
    let kind = media_kind_of(
        representation.contentType.as_deref(),
        representation.mimeType.as_deref(),
    )
    .or_else(|| {
        adaptation
            .ContentComponent
            .first()
            .and_then(|cc| media_kind_of(cc.contentType.as_deref(), None))
    })
    .or_else(|| {
        media_kind_of(
            adaptation.contentType.as_deref(),
            adaptation.mimeType.as_deref(),
        )
    });
    let Some(kind) = kind else {
        return Ok(None);
    };

    let base_url = match representation.BaseURL.first() {
        Some(b) => apply_base(base_url, &b.base)?,
        None => base_url.clone(),
    };

    let mut rep = Representation::new(kind);
    rep.id = representation.id.clone();
    rep.bandwidth = representation.bandwidth.map(|b| b as i64).unwrap_or(0);
    rep.lang = representation
        .lang
        .clone()
        .or_else(|| adaptation.lang.clone());

    let mut identity = Template::new();
    if let Some(id) = &rep.id {
        identity.insert(Template::REPRESENTATION_ID, id.clone());
    }
    identity.insert(Template::BANDWIDTH, rep.bandwidth.to_string());

    let segment_template = representation
        .SegmentTemplate
        .as_ref()
        .or(adaptation.SegmentTemplate.as_ref())
        .or(period.SegmentTemplate.as_ref());
    let segment_list = representation
        .SegmentList
        .as_ref()
        .or(adaptation.SegmentList.as_ref());

    if let Some(template) = segment_template {
        if let Some(initialization) = &template.initialization {
            let init_url = merge_baseurls(&base_url, &identity.resolve(initialization))?;
            rep.init_section = Some(Fragment::new(init_url.to_string()));
        }
        if let Some(media) = &template.media {
            rep.url_template = Some(merge_baseurls(&base_url, media)?.to_string());
        }
        rep.presentation_timeoffset = template
            .presentationTimeOffset
            .map(|t| t as i64)
            .unwrap_or(0);
        rep.fragment_duration = template.duration.map(|d| d as i64).unwrap_or(0);
        rep.fragment_timescale = template.timescale.map(|t| t as i64).unwrap_or(0);
        rep.start_number = template.startNumber.map(|n| n as i64).unwrap_or(1);
        rep.first_seq_no = rep.start_number;

        if let Some(last_segment_number) = supplemental_last_segment_number(adaptation) {
            rep.last_seq_no = last_segment_number - 1;
        }

        if let Some(timeline) = &template.SegmentTimeline {
            rep.timelines = timeline
                .segments
                .iter()
                .map(|s| TimelineEntry {
                    start_time: s.t.map(|t| t as i64).unwrap_or(0),
                    duration: s.d as i64,
                    repeat: s.r.unwrap_or(0),
                })
                .collect();
        }
    } else if representation.BaseURL.first().is_some() && representation.SegmentList.is_none() {
        // a bare BaseURL is a single fragment of unknown size
        rep.fragments.push(Fragment::new(base_url.to_string()));
    } else if let Some(list) = segment_list {
        rep.fragment_duration = list.duration.map(|d| d as i64).unwrap_or(0);
        rep.fragment_timescale = list.timescale.map(|t| t as i64).unwrap_or(0);
        rep.start_number = 1;
        rep.first_seq_no = rep.start_number;

        if let Some(initialization) = &list.Initialization {
            let url = match &initialization.sourceURL {
                Some(source_url) => {
                    merge_baseurls(&base_url, &identity.resolve(source_url))?.to_string()
                }
                None => base_url.to_string(),
            };
            rep.init_section = Some(Fragment::with_range(url, initialization.range.as_deref()));
        }

        for segment_url in &list.segment_urls {
            let url = match &segment_url.media {
                Some(media) => merge_baseurls(&base_url, &identity.resolve(media))?.to_string(),
                None => base_url.to_string(),
            };
            rep.fragments
                .push(Fragment::with_range(url, segment_url.mediaRange.as_deref()));
        }
    } else {
        tracing::warn!(id = ?rep.id, "unknown segment addressing for representation");
        return Ok(None);
    }

    if rep.fragment_duration > 0 && rep.fragment_timescale == 0 {
        rep.fragment_timescale = 1;
    }
    if !rep.timelines.is_empty() && rep.fragment_timescale == 0 {
        rep.fragment_timescale = 1;
    }

    match kind {
        MediaKind::Video => {
            if let Some(framerate) = representation
                .frameRate
                .as_deref()
                .or(adaptation.frameRate.as_deref())
            {
                match Rational::parse(framerate) {
                    Some(rate) => rep.framerate = rate,
                    None => tracing::debug!("ignoring invalid frame rate '{framerate}'"),
                }
            }
            rep.codecs = representation
                .codecs
                .clone()
                .or_else(|| adaptation.codecs.clone());
            rep.scan_type = representation.scanType.clone();
            rep.width = representation.width.unwrap_or(0) as u32;
            rep.height = representation.height.unwrap_or(0) as u32;
        }
        MediaKind::Audio => {
            rep.codecs = representation
                .codecs
                .clone()
                .or_else(|| adaptation.codecs.clone());
        }
        MediaKind::Subtitle => {}
    }

    rep.period_start = info.period_start;
    rep.period_duration = info.period_duration;
    rep.period_media_presentation_duration = info.media_presentation_duration;

    Ok(Some(rep))
}

fn supplemental_last_segment_number(adaptation: &dash_mpd::AdaptationSet) -> Option<i64> {
    adaptation
        .supplemental_property
        .iter()
        .find(|property| {
            property.schemeIdUri == "http://dashif.org/guidelines/last-segment-number"
        })
        .and_then(|property| property.value.as_deref())
        .and_then(|value| value.parse().ok())
}

/// Format probe: the first 4 KiB must contain `<MPD` and a known DASH
/// profile URN.
pub fn probe(data: &[u8]) -> bool {
    let head = &data[..data.len().min(4096)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();

    if !text.contains("<mpd") {
        return false;
    }

    const PROFILES: [&str; 5] = [
        "dash:profile:isoff-on-demand:2011",
        "dash:profile:isoff-live:2011",
        "dash:profile:isoff-live:2012",
        "dash:profile:isoff-main:2011",
        "3gpp:pss:profile:dash1",
    ];
    PROFILES.iter().any(|profile| text.contains(profile)) || text.contains("dash:profile")
}

/// Download the manifest document, capped at [`MAX_MANIFEST_SIZE`]. Returns
/// the document and its final URL (after redirects).
pub async fn fetch_manifest(client: &HttpClient, url: &Url) -> DashResult<(String, Url)> {
    let response = client
        .get(url.clone())
        .header(
            reqwest::header::ACCEPT,
            "application/dash+xml,video/vnd.mpeg.dash.mpd",
        )
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(DashError::HttpStatus(response.status()));
    }
    let final_url = response.url().clone();

    if let Some(length) = response.content_length() {
        if length as usize > MAX_MANIFEST_SIZE {
            return Err(DashError::InvalidManifest(format!(
                "manifest too large: {length} bytes"
            )));
        }
    }

    let mut response = response;
    let mut buf: Vec<u8> = Vec::with_capacity(INITIAL_MANIFEST_SIZE);
    while let Some(chunk) = response.chunk().await? {
        if buf.len() + chunk.len() > MAX_MANIFEST_SIZE {
            return Err(DashError::InvalidManifest(format!(
                "manifest too large: more than {MAX_MANIFEST_SIZE} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }

    let text = String::from_utf8(buf)
        .map_err(|e| DashError::InvalidManifest(format!("manifest is not UTF-8: {e}")))?;
    Ok((text, final_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> dash_mpd::MPD {
        dash_mpd::parse(xml).expect("parseable test MPD")
    }

    fn mpd_url() -> Url {
        Url::parse("https://example.com/media/manifest.mpd").unwrap()
    }

    #[test]
    fn test_fragment_range() {
        let fragment = Fragment::with_range("https://e/seg".to_string(), Some("100-199"));
        assert_eq!(fragment.url_offset, 100);
        assert_eq!(fragment.size, 100);

        let fragment = Fragment::with_range("https://e/seg".to_string(), None);
        assert_eq!(fragment.url_offset, 0);
        assert_eq!(fragment.size, -1);
    }

    #[test]
    fn test_rational_parse() {
        assert_eq!(Rational::parse("30"), Some(Rational::new(30, 1)));
        assert_eq!(Rational::parse("30000/1001"), Some(Rational::new(30000, 1001)));
        assert_eq!(Rational::parse("abc"), None);
    }

    #[test]
    fn test_probe() {
        assert!(probe(
            br#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" profiles="urn:mpeg:dash:profile:isoff-live:2011">"#
        ));
        assert!(probe(
            br#"<?xml version="1.0"?><MPD profiles="urn:mpeg:dash:profile:full:2011">"#
        ));
        assert!(!probe(b"<playlist></playlist>"));
        assert!(!probe(b"#EXTM3U"));
    }

    #[test]
    fn test_template_duration_representation() {
        let mpd = parse(
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT20S">
                 <Period start="PT0S">
                   <AdaptationSet contentType="video">
                     <Representation id="v1" bandwidth="1000000" width="1920" height="1080" frameRate="25" codecs="avc1.64001f">
                       <SegmentTemplate media="seg-$Number$.m4s" initialization="init-$RepresentationID$.mp4" timescale="1" duration="2" startNumber="1"/>
                     </Representation>
                   </AdaptationSet>
                 </Period>
               </MPD>"#,
        );
        let presentation = Presentation::from_mpd(&mpd, &mpd_url(), 0, 0).unwrap();
        assert!(!presentation.info.is_live);
        assert_eq!(presentation.info.media_presentation_duration, 20);
        assert_eq!(presentation.videos.len(), 1);

        let rep = &presentation.videos[0];
        assert_eq!(rep.id.as_deref(), Some("v1"));
        assert_eq!(rep.first_seq_no, 1);
        assert_eq!(rep.fragment_duration, 2);
        assert_eq!(rep.fragment_timescale, 1);
        assert_eq!(rep.width, 1920);
        assert_eq!(rep.framerate, Rational::new(25, 1));
        assert_eq!(
            rep.url_template.as_deref(),
            Some("https://example.com/media/seg-$Number$.m4s")
        );
        assert_eq!(
            rep.init_section.as_ref().unwrap().url,
            "https://example.com/media/init-v1.mp4"
        );
    }

    #[test]
    fn test_segment_list_representation() {
        let mpd = parse(
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT4S">
                 <Period>
                   <AdaptationSet contentType="audio" lang="en">
                     <Representation id="a1" bandwidth="128000">
                       <SegmentList duration="2" timescale="1">
                         <Initialization sourceURL="init.mp4" range="0-739"/>
                         <SegmentURL media="chunk-1.m4s" mediaRange="0-999"/>
                         <SegmentURL media="chunk-2.m4s"/>
                       </SegmentList>
                     </Representation>
                   </AdaptationSet>
                 </Period>
               </MPD>"#,
        );
        let presentation = Presentation::from_mpd(&mpd, &mpd_url(), 0, 0).unwrap();
        assert_eq!(presentation.audios.len(), 1);

        let rep = &presentation.audios[0];
        assert_eq!(rep.lang.as_deref(), Some("en"));
        assert_eq!(rep.fragments.len(), 2);
        assert_eq!(rep.fragments[0].url, "https://example.com/media/chunk-1.m4s");
        assert_eq!(rep.fragments[0].url_offset, 0);
        assert_eq!(rep.fragments[0].size, 1000);
        assert_eq!(rep.fragments[1].size, -1);

        let init = rep.init_section.as_ref().unwrap();
        assert_eq!(init.url, "https://example.com/media/init.mp4");
        assert_eq!(init.size, 740);
    }

    #[test]
    fn test_period_selection_matches_timepoint() {
        let mpd = parse(
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="dynamic" availabilityStartTime="2024-01-01T00:00:00Z">
                 <Period start="PT0S" duration="PT60S">
                   <AdaptationSet contentType="video">
                     <Representation id="v1" bandwidth="1">
                       <SegmentTemplate media="p1-$Number$.m4s" timescale="1" duration="2" startNumber="1"/>
                     </Representation>
                   </AdaptationSet>
                 </Period>
                 <Period start="PT60S">
                   <AdaptationSet contentType="video">
                     <Representation id="v1" bandwidth="1">
                       <SegmentTemplate media="p2-$Number$.m4s" timescale="1" duration="2" startNumber="1"/>
                     </Representation>
                   </AdaptationSet>
                 </Period>
               </MPD>"#,
        );

        // timepoint 30 falls into the first period
        let p = Presentation::from_mpd(&mpd, &mpd_url(), 30, 0).unwrap();
        assert_eq!(p.info.period_start, 0);
        assert!(p.videos[0].url_template.as_deref().unwrap().contains("p1-"));

        // timepoint 90 falls into the second
        let p = Presentation::from_mpd(&mpd, &mpd_url(), 90, 0).unwrap();
        assert_eq!(p.info.period_start, 60);
        assert!(p.videos[0].url_template.as_deref().unwrap().contains("p2-"));
    }

    #[test]
    fn test_missing_type_is_invalid() {
        let mpd = parse(
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011">
                 <Period><AdaptationSet contentType="video">
                   <Representation id="v" bandwidth="1">
                     <SegmentTemplate media="s-$Number$.m4s" duration="2"/>
                   </Representation>
                 </AdaptationSet></Period>
               </MPD>"#,
        );
        assert!(matches!(
            Presentation::from_mpd(&mpd, &mpd_url(), 0, 0),
            Err(DashError::InvalidManifest(_))
        ));
    }
}
