// src/digest.rs
//! Chat digest of a bucketed feed, in Telegram's legacy Markdown.

use chrono::{DateTime, FixedOffset};

use crate::bucket::{group_by_bucket, Bucket};
use crate::event::Event;

/// Telegram's `sendMessage` text limit, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Human label for a source name.
pub fn source_label(source: &str) -> String {
    match source {
        "meetup" => "[Meetup]".to_string(),
        "eventbrite" => "[Eventbrite]".to_string(),
        "devevents" => "[Dev.events]".to_string(),
        other => format!("[{other}]"),
    }
}

/// Escape the characters legacy Markdown treats as entity delimiters.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '[' | ']' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn event_block(ev: &Event, tz: &FixedOffset) -> String {
    let mut s = format!(
        "🎯 *{}* `{}`\n",
        escape_markdown(ev.name.trim()),
        source_label(&ev.source)
    );
    if let Some(start) = ev.start_time {
        s.push_str(&format!(
            "📅 _{}_\n",
            start.with_timezone(tz).format("%A, %b %-d")
        ));
    }
    if let Some(venue) = ev.venue.as_deref().filter(|v| !v.trim().is_empty()) {
        s.push_str(&format!("📍 {}\n", escape_markdown(venue.trim())));
    }
    if let Some(price) = ev.price.as_deref().filter(|p| !p.is_empty() && *p != "Free") {
        s.push_str(&format!("💰 {}\n", escape_markdown(price)));
    }
    if let Some(url) = ev.url.as_deref().filter(|u| !u.trim().is_empty()) {
        s.push_str(&format!("🔗 [View Event]({})\n", link_target(url.trim())));
    }
    s.push('\n');
    s
}

/// Percent-encode the characters that would end a Markdown link target early.
fn link_target(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            ' ' => out.push_str("%20"),
            _ => out.push(c),
        }
    }
    out
}

fn overflow_line(n: usize) -> String {
    format!("_…and {n} more_\n")
}

/// Render `events` grouped by bucket relative to `now`.
///
/// The result never exceeds [`MAX_MESSAGE_CHARS`]; events that do not fit are
/// counted in a trailing "…and N more" line.
pub fn format_digest(city: &str, now: DateTime<FixedOffset>, events: &[Event]) -> String {
    let city = escape_markdown(city.trim());
    if events.is_empty() {
        return format!("📅 *No upcoming events found* for {city} tech community.");
    }

    let header = format!(
        "🚀 *{city} Tech Events - {}*\n\n",
        now.format("%A, %B %-d, %Y")
    );
    let footer = format!("\n_Shared via {city} Tech Events Tracker_");
    let reserve = overflow_line(events.len()).chars().count() + footer.chars().count();

    let mut out = header;
    let mut used = out.chars().count();
    let mut emitted = 0usize;
    let tz = now.timezone();
    let grouped = group_by_bucket(now, events);

    'outer: for bucket in Bucket::ALL {
        let Some(bucket_events) = grouped.get(&bucket) else {
            continue;
        };
        let mut title = Some(format!("*{}:*\n", bucket.label()));
        for ev in bucket_events {
            let block = event_block(ev, &tz);
            let cost = block.chars().count() + title.as_ref().map_or(0, |t| t.chars().count());
            if used + cost + reserve > MAX_MESSAGE_CHARS {
                break 'outer;
            }
            if let Some(t) = title.take() {
                out.push_str(&t);
            }
            out.push_str(&block);
            used += cost;
            emitted += 1;
        }
    }

    let rest = events.len() - emitted;
    if rest > 0 {
        tracing::debug!(emitted, rest, "digest truncated");
        out.push_str(&overflow_line(rest));
    }
    out.push_str(&footer);

    if out.chars().count() > MAX_MESSAGE_CHARS {
        // Only reachable with an absurdly long city name.
        out = out.chars().take(MAX_MESSAGE_CHARS).collect();
    }
    out
}
