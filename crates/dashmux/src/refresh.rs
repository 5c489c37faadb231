//! Live manifest refresh: re-parse the manifest into a shadow presentation
//! and splice the new segment index into a representation without losing the
//! current read position.

use crate::{
    manifest::{self, MediaKind, Presentation, PresentationInfo, Representation},
    sequencer,
    stream::Session,
    DashError, DashOptions, DashResult,
};

/// Re-parse the manifest and splice the target representation's timelines or
/// fragment list. MPD-level attributes commit after any successful parse;
/// the representation's arrays and play position move only when the new
/// manifest still carries a media-compatible representation with the same
/// id. On failure the representation is left exactly as it was.
pub async fn refresh_manifest(session: &mut Session, rep: &mut Representation) -> DashResult<()> {
    let curr_timepoint = current_timepoint(&session.info, rep, &session.options);

    let (text, final_url) =
        manifest::fetch_manifest(&session.fetcher.client, &session.manifest_url).await?;
    let mpd = dash_mpd::parse(&text)?;
    let shadow = Presentation::from_mpd(
        &mpd,
        &final_url,
        curr_timepoint,
        session.info.period_start,
    )?;

    if let Err(e) = session.clock.sync(&mpd.UTCTiming, &session.fetcher.client).await {
        tracing::warn!(error = %e, "failed to re-sync clock with refreshed manifest");
    }

    session.info = shadow.info.clone();
    splice(session, rep, shadow)
}

fn splice(session: &Session, rep: &mut Representation, shadow: Presentation) -> DashResult<()> {
    let mut candidates = match rep.kind {
        MediaKind::Video => shadow.videos,
        MediaKind::Audio => shadow.audios,
        MediaKind::Subtitle => shadow.subtitles,
    };

    let position = candidates
        .iter()
        .position(|candidate| rep.id.is_some() && candidate.id == rep.id)
        .ok_or_else(|| {
            DashError::InvalidManifest(format!(
                "new manifest is missing representation {}",
                rep.id.as_deref().unwrap_or("")
            ))
        })?;
    let srep = candidates.remove(position);

    match rep.kind {
        MediaKind::Video => check_video_params(rep, &srep)?,
        MediaKind::Audio | MediaKind::Subtitle => check_audio_params(rep, &srep)?,
    }

    let options = &session.options;
    let now = session.clock.now_secs();
    let new_period = session.info.period_start > rep.period_start;

    if !srep.timelines.is_empty() || !rep.timelines.is_empty() {
        if new_period {
            tracing::debug!(
                new_start = session.info.period_start,
                old_start = rep.period_start,
                "representation moved to a new period"
            );
            rep.cur_seq_no = srep.first_seq_no;
            move_timelines(rep, &srep, &session.info, options, now);
            reload_init_section(rep, &srep);
        } else {
            // continue the existing timeline at the position already reached
            let correction = options.use_timeline_segment_offset_correction;
            let current_time = sequencer::segment_start_time(rep, correction, rep.cur_seq_no)
                / rep.fragment_timescale.max(1);
            let target = current_time * srep.fragment_timescale.max(1) - 1;
            if let Some(new_seq_no) = sequencer::seg_no_from_timelines(&srep, correction, target) {
                rep.cur_seq_no = new_seq_no;
                move_timelines(rep, &srep, &session.info, options, now);
            }
        }
    } else if !srep.fragments.is_empty() || !rep.fragments.is_empty() {
        if srep.start_number > rep.start_number + rep.fragments.len() as i64 {
            // the window advanced beyond everything previously known
            rep.cur_seq_no = 0;
        } else {
            rep.cur_seq_no += srep.start_number - rep.start_number;
        }
        rep.fragments = srep.fragments.clone();
        rep.start_number = srep.start_number;
        rep.first_seq_no = srep.first_seq_no;
        rep.last_seq_no = sequencer::calc_max_seg_no(rep, &session.info, options, now);
        if new_period {
            reload_init_section(rep, &srep);
            rep.cur_seq_no = rep.start_number;
        }
    }

    rep.period_start = session.info.period_start;
    rep.period_duration = session.info.period_duration;
    rep.period_media_presentation_duration = session.info.media_presentation_duration;

    Ok(())
}

fn move_timelines(
    rep: &mut Representation,
    srep: &Representation,
    info: &PresentationInfo,
    options: &DashOptions,
    now: i64,
) {
    rep.timelines = srep.timelines.clone();
    rep.first_seq_no = srep.first_seq_no;
    rep.start_number = srep.start_number;
    rep.last_seq_no = sequencer::calc_max_seg_no(rep, info, options, now);
}

/// The new period comes with its own initialization section; keep the buffer
/// but force a reload before the next segment is read.
fn reload_init_section(rep: &mut Representation, srep: &Representation) {
    rep.init_section = srep.init_section.clone();
    rep.init_loaded = false;
    rep.init_read_offset = 0;
    rep.init_data_len = 0;
}

fn check_video_params(old: &Representation, new: &Representation) -> DashResult<()> {
    let id = old.id.as_deref().unwrap_or("");
    if old.width != new.width || old.height != new.height {
        tracing::error!(
            id,
            "video resolution changed from {}x{} to {}x{}",
            old.width,
            old.height,
            new.width,
            new.height
        );
        return Err(DashError::InputChanged(format!(
            "{id}: video resolution changed"
        )));
    }
    if old.framerate != new.framerate {
        tracing::error!(
            id,
            "video framerate changed from {}/{} to {}/{}",
            old.framerate.num,
            old.framerate.den,
            new.framerate.num,
            new.framerate.den
        );
        return Err(DashError::InputChanged(format!(
            "{id}: video framerate changed"
        )));
    }
    if old.codecs != new.codecs {
        tracing::error!(id, old = ?old.codecs, new = ?new.codecs, "video codec changed");
        return Err(DashError::InputChanged(format!(
            "{id}: video codec changed"
        )));
    }
    if old.scan_type != new.scan_type {
        tracing::error!(id, "video scan type changed");
        return Err(DashError::InputChanged(format!(
            "{id}: video scan type changed"
        )));
    }
    Ok(())
}

fn check_audio_params(old: &Representation, new: &Representation) -> DashResult<()> {
    if old.codecs != new.codecs {
        let id = old.id.as_deref().unwrap_or("");
        tracing::error!(id, old = ?old.codecs, new = ?new.codecs, "audio codec changed");
        return Err(DashError::InputChanged(format!(
            "{id}: audio codec changed"
        )));
    }
    Ok(())
}

/// Seconds into the presentation at the current read position, handed to the
/// period-selection rule on re-parse.
fn current_timepoint(
    info: &PresentationInfo,
    rep: &Representation,
    options: &DashOptions,
) -> i64 {
    if !info.is_live {
        return 0;
    }
    if !rep.timelines.is_empty() {
        if rep.period_start == 0 {
            return 0;
        }
        let correction = options.use_timeline_segment_offset_correction;
        rep.period_start
            + sequencer::segment_start_time(rep, correction, rep.cur_seq_no)
                / rep.fragment_timescale.max(1)
    } else if rep.fragment_duration > 0 {
        (rep.first_seq_no * rep.fragment_duration) / rep.fragment_timescale.max(1)
    } else {
        0
    }
}
