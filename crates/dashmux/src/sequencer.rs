//! Sequence-number arithmetic: mapping sequence numbers to segment start
//! times and URLs across the three addressing styles, and deriving the
//! current/min/max live sequence numbers from the synchronized clock.
//!
//! All functions are pure over the representation and presentation state;
//! `now_secs` comes from the caller's [`Clock`](crate::clock::Clock) so the
//! arithmetic is testable against a pinned wall clock.

use crate::{
    manifest::{Fragment, PresentationInfo, Representation},
    template::Template,
    DashOptions,
};

/// Start time of segment `seq` in `@timescale` units, walked from the
/// timeline entries. With `use_timeline_segment_offset_correction` the
/// target is first normalized by `first_seq_no`, for manifests that index
/// timeline entries from `startNumber` rather than from zero.
///
/// An unmatched target returns the accumulated end of the timeline.
pub fn segment_start_time(rep: &Representation, correction: bool, mut seq: i64) -> i64 {
    if rep.timelines.is_empty() {
        return 0;
    }
    if correction && seq >= rep.first_seq_no {
        seq -= rep.first_seq_no;
    }

    let mut start_time = 0;
    let mut num = 0;
    for entry in &rep.timelines {
        if entry.start_time > 0 {
            start_time = entry.start_time;
        }
        if num == seq {
            return start_time;
        }

        start_time += entry.duration;

        if entry.repeat == -1 {
            // "repeat until end of period": closed form
            return entry.duration * seq;
        }

        for _ in 0..entry.repeat {
            num += 1;
            if num == seq {
                return start_time;
            }
            start_time += entry.duration;
        }
        num += 1;
    }

    start_time
}

/// Inverse of [`segment_start_time`]: the first sequence number whose start
/// time is `>= time`. `None` when the timeline ends before `time`.
pub fn seg_no_from_timelines(rep: &Representation, correction: bool, time: i64) -> Option<i64> {
    let adjust = |num: i64| {
        if correction {
            num + rep.first_seq_no
        } else {
            num
        }
    };

    let mut start_time = 0;
    let mut num = 0;
    for entry in &rep.timelines {
        if entry.start_time > 0 {
            start_time = entry.start_time;
        }
        if start_time >= time {
            return Some(adjust(num));
        }

        for _ in 0..entry.repeat {
            start_time += entry.duration;
            num += 1;
            if start_time >= time {
                return Some(adjust(num));
            }
        }
        start_time += entry.duration;
        num += 1;
    }

    None
}

/// The sequence number to start playing from, evaluated when a
/// representation is opened or has to catch up to the live window.
pub fn calc_cur_seg_no(
    rep: &Representation,
    info: &PresentationInfo,
    options: &DashOptions,
    now_secs: i64,
) -> i64 {
    if !info.is_live {
        return rep.first_seq_no;
    }

    if !rep.fragments.is_empty() {
        rep.first_seq_no
    } else if !rep.timelines.is_empty() {
        // 60 seconds back from the end of the timeline
        let correction = options.use_timeline_segment_offset_correction;
        let end_of_timeline = segment_start_time(rep, correction, i64::from(u32::MAX));
        let start_time_offset = end_of_timeline - 60 * rep.fragment_timescale;
        seg_no_from_timelines(rep, correction, start_time_offset).unwrap_or(rep.first_seq_no)
    } else if rep.fragment_duration > 0 {
        let timescale = rep.fragment_timescale;
        let duration = rep.fragment_duration;
        if rep.presentation_timeoffset != 0 {
            rep.first_seq_no
                + ((now_secs - info.availability_start_time) * timescale
                    - rep.presentation_timeoffset)
                    / duration
                - info.min_buffer_time
        } else if info.publish_time > 0 && info.availability_start_time == 0 {
            let mut num = if info.min_buffer_time > 0 {
                rep.first_seq_no
                    + ((info.publish_time + duration - info.suggested_presentation_delay)
                        * timescale)
                        / duration
                    - info.min_buffer_time
            } else {
                rep.first_seq_no
                    + ((info.publish_time - info.time_shift_buffer_depth + duration
                        - info.suggested_presentation_delay)
                        * timescale)
                        / duration
            };
            if completed_only_guard(rep, info, options, num)
                && info.suggested_presentation_delay == 0
            {
                num -= 1;
            }
            num
        } else {
            let mut num = rep.first_seq_no
                + ((now_secs - info.availability_start_time - info.suggested_presentation_delay)
                    * timescale)
                    / duration;
            if completed_only_guard(rep, info, options, num)
                && info.suggested_presentation_delay == 0
            {
                num -= 1;
            }
            num
        }
    } else {
        rep.first_seq_no
    }
}

/// Do not request the live head segment before the provider finalizes it.
fn completed_only_guard(
    rep: &Representation,
    info: &PresentationInfo,
    options: &DashOptions,
    num: i64,
) -> bool {
    options.fetch_completed_segments_only
        && num > rep.first_seq_no
        && info.time_shift_buffer_depth == 0
}

/// Oldest sequence number the server still serves (the time-shift buffer
/// tail).
pub fn calc_min_seg_no(
    rep: &Representation,
    info: &PresentationInfo,
    options: &DashOptions,
    now_secs: i64,
) -> i64 {
    if info.is_live && rep.fragment_duration > 0 {
        let mut num = rep.first_seq_no
            + ((now_secs - info.availability_start_time - info.time_shift_buffer_depth)
                * rep.fragment_timescale)
                / rep.fragment_duration;
        if completed_only_guard(rep, info, options, num) {
            num -= 1;
        }
        num
    } else {
        rep.first_seq_no
    }
}

/// Newest sequence number known to exist.
pub fn calc_max_seg_no(
    rep: &Representation,
    info: &PresentationInfo,
    options: &DashOptions,
    now_secs: i64,
) -> i64 {
    if !rep.fragments.is_empty() {
        rep.first_seq_no + rep.fragments.len() as i64 - 1
    } else if !rep.timelines.is_empty() {
        let mut num = rep.first_seq_no + rep.timelines.len() as i64 - 1;
        for entry in &rep.timelines {
            if entry.repeat == -1 {
                let segment_secs = (entry.duration / rep.fragment_timescale).max(1);
                num = info.period_duration / segment_secs;
            } else {
                num += entry.repeat;
            }
        }
        num
    } else if info.is_live && rep.fragment_duration > 0 {
        let mut num = rep.first_seq_no
            + ((now_secs - info.availability_start_time) * rep.fragment_timescale)
                / rep.fragment_duration;
        if num > rep.first_seq_no && options.fetch_completed_segments_only {
            num -= 1;
        }
        num
    } else if rep.fragment_duration > 0 {
        // VOD: ceil(presentation duration / segment duration) segments
        let total = info.media_presentation_duration * rep.fragment_timescale;
        let count = (total + rep.fragment_duration - 1) / rep.fragment_duration;
        rep.first_seq_no + count.max(1) - 1
    } else {
        0
    }
}

/// Build the fragment for the representation's current sequence number, or
/// `None` when the sequence number has no counterpart (end of stream for an
/// explicit list, or no addressing at all).
pub fn current_fragment(rep: &Representation, options: &DashOptions) -> Option<Fragment> {
    let seq = rep.cur_seq_no;

    if !rep.fragments.is_empty() {
        let index = seq - rep.first_seq_no;
        return usize::try_from(index)
            .ok()
            .and_then(|index| rep.fragments.get(index))
            .cloned();
    }

    let template = rep.url_template.as_deref()?;
    let time = if !rep.timelines.is_empty() {
        segment_start_time(rep, options.use_timeline_segment_offset_correction, seq)
    } else {
        (seq - rep.first_seq_no) * rep.fragment_duration + rep.presentation_timeoffset
    };

    let mut vars = Template::new();
    if let Some(id) = &rep.id {
        vars.insert(Template::REPRESENTATION_ID, id.clone());
    }
    vars.insert(Template::BANDWIDTH, rep.bandwidth.to_string())
        .insert(Template::NUMBER, seq.to_string())
        .insert(Template::TIME, time.to_string());

    Some(Fragment::new(vars.resolve(template)))
}

/// The sequence number whose segment covers `msec` milliseconds into the
/// presentation (timeline style). The caller clamps to `last_seq_no`.
pub fn seq_no_for_position_msec(rep: &Representation, msec: i64) -> i64 {
    let timescale = rep.fragment_timescale.max(1);
    let mut num = rep.first_seq_no;
    let mut duration = 0;

    for entry in &rep.timelines {
        if entry.start_time > 0 {
            duration = entry.start_time;
        }
        duration += entry.duration;
        if msec < duration * 1000 / timescale {
            return num;
        }
        for _ in 0..entry.repeat {
            duration += entry.duration;
            num += 1;
            if msec < duration * 1000 / timescale {
                return num;
            }
        }
        num += 1;
    }

    num
}
