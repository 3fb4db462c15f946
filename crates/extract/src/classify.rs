//! Pure, path-only classification of media files.

use std::path::Path;

use exn::OptionExt;
use regex::Captures;

use crate::consts::{
    CROSS_EPISODE_REGEX, RESOLUTION_REGEX, SEASON_DIR_REGEX, SEASON_EPISODE_REGEX, SOURCE_REGEX, TRACK_PREFIX_REGEX,
    WHITESPACE_REGEX, YEAR_REGEX,
};
use crate::error::{ErrorKind, Result};
use crate::models::{Classification, MediaKind, MediaType};

/// Classifies a media file from its path alone, never touching the
/// filesystem.
///
/// The media type comes from the extension. Video names are searched for
/// an episode marker (`S01E02`, `1x02`), a release year, a resolution tag
/// and a source tag; the title is whatever precedes the first of those.
///
/// # Errors
///
/// Returns [`UnsupportedFormat`](ErrorKind::UnsupportedFormat) when the
/// extension is missing or not a known media extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use omni_extract::classify;
/// use omni_extract::models::MediaKind;
///
/// let c = classify(Path::new("/tv/ShowName.S01E02.mp4")).unwrap();
/// assert_eq!(c.kind, MediaKind::TvEpisode);
/// assert_eq!(c.title, "ShowName");
/// assert_eq!((c.season, c.episode), (Some(1), Some(2)));
/// ```
pub fn classify(path: &Path) -> Result<Classification> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_raise(|| ErrorKind::UnsupportedFormat("no file extension".to_string()))?;
    let media_type = MediaType::from_extension(&extension)
        .ok_or_raise(|| ErrorKind::UnsupportedFormat(format!("unrecognised extension: .{extension}")))?;
    let name = normalise(&path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default());

    Ok(match media_type {
        MediaType::Video => classify_video(path, &name),
        MediaType::Audio => classify_audio(&name),
        MediaType::Image => Classification {
            media_type,
            kind: MediaKind::Image,
            title: name,
            year: None,
            season: None,
            episode: None,
            track: None,
            resolution: None,
            source: None,
        },
    })
}

fn classify_video(path: &Path, name: &str) -> Classification {
    let marker = SEASON_EPISODE_REGEX.captures(name).or_else(|| CROSS_EPISODE_REGEX.captures(name));
    // A leading year is part of the title ("2012", "1917"), never the
    // release year.
    let year = YEAR_REGEX.find_iter(name).filter(|m| m.start() > 0).last();
    let resolution = RESOLUTION_REGEX.find(name);
    let source = SOURCE_REGEX.find(name);

    let cut = [marker.as_ref().and_then(|c| c.get(0)), year, resolution, source]
        .into_iter()
        .flatten()
        .map(|m| m.start())
        .min()
        .unwrap_or(name.len());
    let mut title = clean_title(&name[..cut]);

    let (season, episode) = marker.as_ref().map(episode_numbers).unwrap_or_default();
    let kind = if marker.is_some() {
        if title.is_empty() {
            title = show_from_directories(path).unwrap_or_default();
        }
        MediaKind::TvEpisode
    } else if year.is_some() || resolution.is_some() || source.is_some() {
        MediaKind::Movie
    } else {
        MediaKind::Video
    };
    if title.is_empty() {
        title = name.to_string();
    }

    Classification {
        media_type: MediaType::Video,
        kind,
        title,
        year: year.and_then(|m| m.as_str().parse().ok()),
        season,
        episode,
        track: None,
        resolution: resolution.map(|m| m.as_str().to_ascii_lowercase()),
        source: source.map(|m| normalise_source(m.as_str())),
    }
}

fn classify_audio(name: &str) -> Classification {
    let (track, title) = match TRACK_PREFIX_REGEX.captures(name) {
        Some(caps) => (caps[1].parse().ok(), clean_title(&caps[2])),
        None => (None, name.to_string()),
    };
    Classification {
        media_type: MediaType::Audio,
        kind: MediaKind::Music,
        title,
        year: None,
        season: None,
        episode: None,
        track,
        resolution: None,
        source: None,
    }
}

fn episode_numbers(caps: &Captures<'_>) -> (Option<u32>, Option<u32>) {
    (caps[1].parse().ok(), caps[2].parse().ok())
}

/// Name of the nearest enclosing directory that isn't a season folder.
fn show_from_directories(path: &Path) -> Option<String> {
    path.ancestors()
        .skip(1)
        .filter_map(|dir| dir.file_name())
        .map(|name| normalise(&name.to_string_lossy()))
        .find(|name| !name.is_empty() && !SEASON_DIR_REGEX.is_match(name))
}

/// Dots and underscores are word separators in release names.
fn normalise(stem: &str) -> String {
    let spaced = stem.replace(['.', '_'], " ");
    WHITESPACE_REGEX.replace_all(spaced.trim(), " ").into_owned()
}

fn clean_title(raw: &str) -> String {
    raw.trim_end_matches([' ', '-', '(', '[']).trim_start_matches([' ', '-']).to_string()
}

fn normalise_source(tag: &str) -> String {
    let compact: String = tag.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_ascii_lowercase();
    match compact.as_str() {
        "bluray" | "bdrip" | "brrip" => "bluray".to_string(),
        "webdl" => "web-dl".to_string(),
        _ => compact,
    }
}
