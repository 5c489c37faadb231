//! The per-representation byte stream handed to a container parser: a single
//! contiguous stream assembled from the initialization section and the
//! sequence of media segments, with live refresh hidden behind `read`.

use url::Url;

use crate::{
    clock::Clock,
    fetch::{ByteSource, Fetcher},
    manifest::{Fragment, PresentationInfo, Representation},
    refresh, sequencer, DashError, DashOptions, DashResult,
};

const MAX_INIT_SECTION_SIZE: usize = 1024 * 1024;

/// Shared demuxer state that every representation reader needs next to the
/// representation itself: the presentation attributes, the fetcher, the
/// synchronized clock and the manifest location for live refresh.
pub struct Session {
    pub info: PresentationInfo,
    pub fetcher: Fetcher,
    pub options: DashOptions,
    pub manifest_url: Url,
    pub clock: Clock,
}

impl Session {
    pub(crate) fn interrupted(&self) -> bool {
        self.options.interrupted()
    }
}

/// Byte stream over one representation, borrowed for the duration of one
/// container-parser call.
pub struct SegmentReader<'a> {
    pub session: &'a mut Session,
    pub rep: &'a mut Representation,
}

impl<'a> SegmentReader<'a> {
    pub fn new(session: &'a mut Session, rep: &'a mut Representation) -> Self {
        Self { session, rep }
    }

    /// Read stream bytes into `buf`; `Ok(0)` is end of stream. Init-section
    /// bytes for a segment always precede its body bytes; segment switches
    /// and live manifest refresh happen transparently inside this call.
    pub async fn read(&mut self, buf: &mut [u8]) -> DashResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.session.interrupted() {
                return Err(DashError::Interrupted);
            }

            if self.rep.input.is_none() {
                self.rep.cur_seg = None;
                let Some(seg) = self.next_fragment().await? else {
                    return Ok(0);
                };
                self.rep.cur_seg = Some(seg.clone());

                if let Err(e) = self.update_init_section().await {
                    tracing::warn!(error = %e, "failed to load initialization section");
                    self.advance_after_open_failure();
                    continue;
                }
                if let Err(e) = self.open_input(seg).await {
                    tracing::warn!(error = %e, "failed to open fragment of representation");
                    self.advance_after_open_failure();
                    continue;
                }
            }

            // push the init section out before the first body byte
            if self.rep.init_read_offset < self.rep.init_data_len {
                let n = (self.rep.init_data_len - self.rep.init_read_offset).min(buf.len());
                buf[..n].copy_from_slice(
                    &self.rep.init_buf[self.rep.init_read_offset..self.rep.init_read_offset + n],
                );
                self.rep.init_read_offset += n;
                return Ok(n);
            }

            let n = self.read_from_input(buf).await?;
            if n > 0 {
                return Ok(n);
            }

            // segment exhausted
            if self.session.info.is_live || self.rep.cur_seq_no < self.rep.last_seq_no {
                self.rep.cur_seq_no += 1;
                self.rep.is_restart_needed = true;
                self.rep.input = None;
                continue;
            }
            // transient "need next fragment" position past the last segment
            self.rep.cur_seq_no += 1;
            self.rep.input = None;
            return Ok(0);
        }
    }

    /// Byte-level seeking is only available for VOD presentations addressed
    /// by an explicit fragment list, before any init section bytes exist.
    pub fn byte_seek_supported(&self) -> bool {
        !self.session.info.is_live && !self.rep.fragments.is_empty() && self.rep.init_data_len == 0
    }

    /// Reposition within the current fragment. Unsupported streams fail with
    /// [`DashError::SeekNotSupported`]; the demuxer-level seek must be used
    /// instead.
    pub async fn byte_seek(&mut self, offset: i64) -> DashResult<i64> {
        if !self.byte_seek_supported() {
            return Err(DashError::SeekNotSupported);
        }
        let seg = match &self.rep.cur_seg {
            Some(seg) => seg.clone(),
            None => match sequencer::current_fragment(self.rep, &self.session.options) {
                Some(seg) => seg,
                None => return Err(DashError::SeekNotSupported),
            },
        };

        let remaining = if seg.size >= 0 { seg.size - offset } else { -1 };
        let input = self
            .session
            .fetcher
            .open(&seg.url, seg.url_offset + offset, remaining)
            .await?;
        self.rep.input = Some(input);
        self.rep.cur_seg_offset = offset;
        self.rep.cur_seg_size = seg.size;
        self.rep.cur_seg = Some(seg);
        Ok(offset)
    }

    /// Container parsers must not reach out to external resources named
    /// inside the media itself.
    pub fn open_nested(&self, url: &str) -> DashResult<ByteSource> {
        tracing::error!(
            url,
            "a playlist item referred to an external file; opening it is forbidden for security reasons"
        );
        Err(DashError::PermissionDenied(url.to_string()))
    }

    fn advance_after_open_failure(&mut self) {
        // live playback must not run ahead of the provider; the refresh in
        // next_fragment re-evaluates the window on the next iteration
        if !self.session.info.is_live {
            self.rep.cur_seq_no += 1;
        }
    }

    /// Resolve the fragment for `cur_seq_no`, refreshing the manifest when a
    /// live representation runs past the known window or falls behind it.
    async fn next_fragment(&mut self) -> DashResult<Option<Fragment>> {
        let is_live = self.session.info.is_live;

        // explicit fragment list
        while !self.rep.fragments.is_empty() {
            if self.session.interrupted() {
                return Err(DashError::Interrupted);
            }
            if let Some(seg) = sequencer::current_fragment(self.rep, &self.session.options) {
                return Ok(Some(seg));
            }
            if !is_live {
                return Ok(None);
            }
            refresh::refresh_manifest(self.session, self.rep).await?;
        }

        if is_live {
            let now = self.session.clock.now_secs();
            let min_seq_no =
                sequencer::calc_min_seg_no(self.rep, &self.session.info, &self.session.options, now);
            let mut max_seq_no =
                sequencer::calc_max_seg_no(self.rep, &self.session.info, &self.session.options, now);

            if self.rep.cur_seq_no <= min_seq_no {
                tracing::debug!(
                    cur = self.rep.cur_seq_no,
                    min = min_seq_no,
                    max = max_seq_no,
                    "segment fell out of the time shift buffer"
                );
                refresh::refresh_manifest(self.session, self.rep).await?;
                self.rep.cur_seq_no = sequencer::calc_cur_seg_no(
                    self.rep,
                    &self.session.info,
                    &self.session.options,
                    self.session.clock.now_secs(),
                );
            } else if self.rep.cur_seq_no > max_seq_no
                && (!self.rep.timelines.is_empty() || !self.rep.fragments.is_empty())
            {
                // keep refreshing until there is a segment available to pull
                while self.rep.cur_seq_no > max_seq_no {
                    if self.session.interrupted() {
                        return Err(DashError::Interrupted);
                    }
                    tracing::debug!(
                        cur = self.rep.cur_seq_no,
                        max = max_seq_no,
                        "no fragment available yet, refreshing"
                    );
                    refresh::refresh_manifest(self.session, self.rep).await?;
                    max_seq_no = sequencer::calc_max_seg_no(
                        self.rep,
                        &self.session.info,
                        &self.session.options,
                        self.session.clock.now_secs(),
                    );
                }
            }
            Ok(sequencer::current_fragment(self.rep, &self.session.options))
        } else if self.rep.cur_seq_no <= self.rep.last_seq_no {
            Ok(sequencer::current_fragment(self.rep, &self.session.options))
        } else {
            Ok(None)
        }
    }

    /// Download the Media Initialization Section once per representation,
    /// into a buffer capped at 1 MiB.
    pub(crate) async fn update_init_section(&mut self) -> DashResult<()> {
        if self.rep.init_loaded {
            return Ok(());
        }
        let Some(mut init) = self.rep.init_section.clone() else {
            return Ok(());
        };

        if init.size < 0 {
            init.size = self.session.fetcher.probe_size(&init.url).await;
        }
        let mut source = self
            .session
            .fetcher
            .open(&init.url, init.url_offset, init.size)
            .await?;

        let sec_size = if init.size >= 0 {
            (init.size as usize).min(MAX_INIT_SECTION_SIZE)
        } else {
            MAX_INIT_SECTION_SIZE
        };
        tracing::debug!(url = %init.url, sec_size, "downloading initialization section");

        self.rep.init_buf.clear();
        self.rep.init_buf.resize(sec_size, 0);
        let mut filled = 0;
        while filled < sec_size {
            let n = source.read(&mut self.rep.init_buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        self.rep.init_buf.truncate(filled);
        self.rep.init_data_len = filled;
        self.rep.init_read_offset = 0;
        self.rep.init_loaded = true;
        self.rep.init_section = Some(init);
        Ok(())
    }

    async fn open_input(&mut self, mut seg: Fragment) -> DashResult<()> {
        if seg.size < 0 {
            seg.size = self.session.fetcher.probe_size(&seg.url).await;
        }
        tracing::trace!(
            url = %seg.url,
            offset = seg.url_offset,
            size = seg.size,
            "requesting segment"
        );

        let input = self
            .session
            .fetcher
            .open(&seg.url, seg.url_offset, seg.size)
            .await?;
        self.rep.input = Some(input);
        self.rep.cur_seg_offset = 0;
        self.rep.cur_seg_size = seg.size;
        self.rep.cur_seg = Some(seg);
        Ok(())
    }

    async fn read_from_input(&mut self, buf: &mut [u8]) -> DashResult<usize> {
        // limit the read when the fragment is only part of a resource
        let len = if self.rep.cur_seg_size >= 0 {
            let remaining = self.rep.cur_seg_size - self.rep.cur_seg_offset;
            (remaining.max(0) as usize).min(buf.len())
        } else {
            buf.len()
        };
        if len == 0 {
            return Ok(0);
        }

        let Some(input) = self.rep.input.as_mut() else {
            return Ok(0);
        };
        let n = input.read(&mut buf[..len]).await?;
        self.rep.cur_seg_offset += n as i64;
        Ok(n)
    }
}
