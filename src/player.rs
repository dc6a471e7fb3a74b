use anyhow::{Result, anyhow, bail};
use dialoguer::Select;
use regex::Regex;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::history::theme;
use crate::types::{EpisodeStream, SubtitleTrack, VideoSource};

pub const PLAYER_ENV_KEY: &str = "ANISTREAM_PLAYER";
pub const NO_SUBTITLES_LABEL: &str = "No subtitles";

static YOUTUBE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:embed/|watch\?v=|youtu\.be/|/v/|/e/|watch\?feature=player_embedded&v=)([^#&?/]*)")
        .expect("valid youtube regex")
});

/// Prefers the adaptive (m3u8) source; otherwise the first progressive one.
pub fn select_source(stream: &EpisodeStream) -> Result<&VideoSource> {
    stream
        .sources
        .iter()
        .find(|source| source.is_m3u8)
        .or_else(|| stream.sources.first())
        .ok_or_else(|| anyhow!("No playable source returned for this episode"))
}

pub fn default_subtitle(tracks: &[SubtitleTrack], preferred: &str) -> Option<usize> {
    tracks
        .iter()
        .position(|track| track.lang.eq_ignore_ascii_case(preferred))
}

/// Lets the user pick a subtitle track. `None` means subtitles off.
pub fn choose_subtitle(tracks: &[SubtitleTrack], preferred: &str) -> Result<Option<usize>> {
    if tracks.is_empty() {
        return Ok(None);
    }
    let default = default_subtitle(tracks, preferred);
    let mut labels = vec![NO_SUBTITLES_LABEL.to_string()];
    labels.extend(tracks.iter().map(|t| t.lang.clone()));

    let selection = Select::with_theme(&theme())
        .with_prompt("Subtitles")
        .items(&labels)
        .default(default.map(|idx| idx + 1).unwrap_or(0))
        .interact_opt()?;
    Ok(match selection {
        Some(0) | None => None,
        Some(idx) => Some(idx - 1),
    })
}

/// Splits a configured player command line, e.g. `mpv --fs`.
pub fn player_command(configured: &str) -> Result<(String, Vec<String>)> {
    let mut parts = shlex::split(configured)
        .filter(|parts| !parts.is_empty())
        .ok_or_else(|| anyhow!("Invalid player command: {configured:?}"))?;
    let program = parts.remove(0);
    Ok((program, parts))
}

pub fn build_player_args(
    source: &VideoSource,
    stream: &EpisodeStream,
    subtitle: Option<usize>,
    media_title: &str,
) -> Vec<String> {
    let mut args = vec![
        String::from("--quiet"),
        String::from("--terminal=no"),
        format!("--force-media-title={media_title}"),
    ];

    // The selected track goes first so it becomes the active external subtitle.
    if let Some(track) = subtitle.and_then(|idx| stream.subtitles.get(idx)) {
        args.push(format!("--sub-file={}", track.url));
    }
    for (idx, track) in stream.subtitles.iter().enumerate() {
        if Some(idx) != subtitle {
            args.push(format!("--sub-file={}", track.url));
        }
    }
    // mpv auto-selects the first external track; `auto` overrides a `sid=no` in mpv.conf.
    if subtitle.is_some_and(|idx| idx < stream.subtitles.len()) {
        args.push(String::from("--sid=auto"));
    } else {
        args.push(String::from("--sid=no"));
    }

    let mut headers: Vec<_> = stream.headers.iter().collect();
    headers.sort();
    for (key, value) in headers {
        if key.eq_ignore_ascii_case("user-agent") {
            args.push(format!("--user-agent={value}"));
        } else if key.eq_ignore_ascii_case("referer") {
            args.push(format!("--referrer={value}"));
            args.push(format!("--http-header-fields=Referer: {value}"));
        } else {
            args.push(format!("--http-header-fields={key}: {value}"));
        }
    }
    args.push(source.url.clone());
    args
}

pub async fn launch_player(configured: &str, args: &[String]) -> Result<()> {
    let (program, base_args) = player_command(configured)?;
    let mut cmd = Command::new(&program);
    cmd.args(&base_args).args(args);
    debug!(program = %program, ?args, "launching player");

    let status = match cmd.status().await {
        Ok(status) => status,
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                return Err(anyhow!(
                    "Player '{}' not found. Install mpv or set {} to a valid command.",
                    program,
                    PLAYER_ENV_KEY
                ));
            }
            return Err(anyhow!(err).context(format!("failed to launch player '{program}'")));
        }
    };

    if !status.success() {
        bail!("player exited with status {status}");
    }
    info!(program = %program, "player exited");
    Ok(())
}

pub fn youtube_id(embed_url: &str) -> Option<String> {
    YOUTUBE_ID
        .captures(embed_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}

pub fn trailer_watch_url(embed_url: &str) -> String {
    match youtube_id(embed_url) {
        Some(id) => format!("https://www.youtube.com/watch?v={id}"),
        None => embed_url.to_string(),
    }
}

pub fn open_trailer(embed_url: &str) -> Result<()> {
    let url = trailer_watch_url(embed_url);
    open::that(&url).map_err(|err| anyhow!(err).context(format!("failed to open {url}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn track(lang: &str) -> SubtitleTrack {
        SubtitleTrack {
            url: format!("https://cc.example/{}.vtt", lang.to_lowercase()),
            lang: lang.to_string(),
        }
    }

    fn stream() -> EpisodeStream {
        EpisodeStream {
            sources: vec![
                VideoSource {
                    url: "https://cdn.example/360.mp4".to_string(),
                    is_m3u8: false,
                    quality: Some("360p".to_string()),
                },
                VideoSource {
                    url: "https://cdn.example/master.m3u8".to_string(),
                    is_m3u8: true,
                    quality: Some("auto".to_string()),
                },
            ],
            subtitles: vec![track("Spanish"), track("English"), track("Portuguese")],
            headers: HashMap::from([("Referer".to_string(), "https://megacloud.tv/".to_string())]),
        }
    }

    #[test]
    fn test_select_source_prefers_hls() {
        let stream = stream();
        assert_eq!(select_source(&stream).unwrap().url, "https://cdn.example/master.m3u8");

        let mut progressive = stream.clone();
        progressive.sources.remove(1);
        assert_eq!(select_source(&progressive).unwrap().url, "https://cdn.example/360.mp4");

        assert!(select_source(&EpisodeStream::default()).is_err());
    }

    #[test]
    fn test_default_subtitle_matches_language_case_insensitively() {
        let tracks = stream().subtitles;
        assert_eq!(default_subtitle(&tracks, "english"), Some(1));
        assert_eq!(default_subtitle(&tracks, "ENGLISH"), Some(1));
        assert_eq!(default_subtitle(&tracks, "german"), None);
        assert_eq!(default_subtitle(&[], "english"), None);
    }

    #[test]
    fn test_build_player_args_puts_selected_subtitle_first() {
        let stream = stream();
        let source = select_source(&stream).unwrap();
        let args = build_player_args(source, &stream, Some(1), "Frieren - Episode 1");

        let subs: Vec<&String> = args.iter().filter(|a| a.starts_with("--sub-file=")).collect();
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0], "--sub-file=https://cc.example/english.vtt");
        assert!(!args.contains(&"--sid=no".to_string()));
        assert!(args.contains(&"--sid=auto".to_string()));
        assert!(args.contains(&"--referrer=https://megacloud.tv/".to_string()));
        assert_eq!(args.last().unwrap(), "https://cdn.example/master.m3u8");
    }

    #[test]
    fn test_build_player_args_without_subtitles_disables_them() {
        let stream = stream();
        let source = select_source(&stream).unwrap();
        let args = build_player_args(source, &stream, None, "Frieren - Episode 1");
        assert!(args.contains(&"--sid=no".to_string()));
        assert!(args.contains(&"--force-media-title=Frieren - Episode 1".to_string()));
        assert!(!args.contains(&"--sid=auto".to_string()));

        let out_of_range = build_player_args(source, &stream, Some(9), "Frieren - Episode 1");
        assert!(out_of_range.contains(&"--sid=no".to_string()));
    }

    #[test]
    fn test_player_command_splits_shell_words() {
        let (program, args) = player_command("mpv --fs --ytdl-format='best[height<=720]'").unwrap();
        assert_eq!(program, "mpv");
        assert_eq!(args, vec!["--fs", "--ytdl-format=best[height<=720]"]);
        assert!(player_command("").is_err());
        assert!(player_command("mpv 'unterminated").is_err());
    }

    #[test]
    fn test_trailer_watch_url_from_embed() {
        assert_eq!(
            trailer_watch_url("https://www.youtube-nocookie.com/embed/qgQ0Gz6jQ4k?enablejsapi=1&wmode=opaque"),
            "https://www.youtube.com/watch?v=qgQ0Gz6jQ4k"
        );
        assert_eq!(youtube_id("https://youtu.be/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(trailer_watch_url("https://vimeo.com/1"), "https://vimeo.com/1");
    }
}
