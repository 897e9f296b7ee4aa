/// Metadata extraction using lofty
use crate::error::{MetadataError, Result};
use coda_core::TrackMetadata;
use lofty::{AudioFile, FileType, TaggedFileExt};
use std::path::Path;

/// Read full track metadata (tags, stream properties, replaygain) from an
/// audio file. Blocking; see [`read_metadata`] for the async wrapper.
pub fn read_metadata_blocking(path: &Path) -> Result<TrackMetadata> {
    if !path.exists() {
        return Err(MetadataError::FileNotFound(path.display().to_string()));
    }

    let tagged_file =
        lofty::read_from_path(path).map_err(|e| MetadataError::ParseError(e.to_string()))?;

    let mut metadata = TrackMetadata::new();

    let properties = tagged_file.properties();
    metadata.duration_ms = Some(properties.duration().as_millis() as u64);
    metadata.sample_rate_hz = properties.sample_rate();
    metadata.bits_per_sample = properties.bit_depth();
    metadata.channels = properties.channels();
    metadata.bitrate_kbps = properties
        .audio_bitrate()
        .or_else(|| properties.overall_bitrate());
    metadata.codec = Some(codec_name(tagged_file.file_type()).to_string());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.tags().first()) {
        apply_tag(&mut metadata, tag);
    }

    Ok(metadata)
}

/// Async wrapper running the blocking extraction on the blocking pool
pub async fn read_metadata(path: &Path) -> Result<TrackMetadata> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_metadata_blocking(&path))
        .await
        .map_err(|_| MetadataError::Cancelled)?
}

/// Copy tag items into the metadata struct
fn apply_tag(metadata: &mut TrackMetadata, tag: &lofty::Tag) {
    for item in tag.items() {
        match item.key() {
            lofty::ItemKey::TrackTitle => {
                metadata.title = item.value().text().map(|s| s.to_string());
            }
            lofty::ItemKey::TrackArtist => {
                metadata.artist = item.value().text().map(|s| s.to_string());
            }
            lofty::ItemKey::AlbumTitle => {
                metadata.album = item.value().text().map(|s| s.to_string());
            }
            lofty::ItemKey::AlbumArtist => {
                metadata.album_artist = item.value().text().map(|s| s.to_string());
            }
            lofty::ItemKey::Genre => {
                metadata.genre = item.value().text().map(|s| s.to_string());
            }
            lofty::ItemKey::Year => {
                if let Some(text) = item.value().text() {
                    metadata.year = text.parse().ok();
                }
            }
            lofty::ItemKey::TrackNumber => {
                if let Some(text) = item.value().text() {
                    metadata.track_number = text.parse().ok();
                }
            }
            lofty::ItemKey::DiscNumber => {
                if let Some(text) = item.value().text() {
                    metadata.disc_number = text.parse().ok();
                }
            }
            lofty::ItemKey::ReplayGainTrackGain => {
                if let Some(text) = item.value().text() {
                    metadata.rg_track_gain_db = parse_gain_db(text);
                }
            }
            lofty::ItemKey::ReplayGainTrackPeak => {
                if let Some(text) = item.value().text() {
                    metadata.rg_track_peak = text.trim().parse().ok();
                }
            }
            _ => {}
        }
    }
}

/// Parse a replaygain gain value, tolerating the conventional " dB" suffix
fn parse_gain_db(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_suffix("dB")
        .or_else(|| trimmed.strip_suffix("db"))
        .unwrap_or(trimmed)
        .trim();
    trimmed.parse().ok()
}

fn codec_name(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Aac => "AAC",
        FileType::Aiff => "AIFF",
        FileType::Ape => "APE",
        FileType::Flac => "FLAC",
        FileType::Mpeg => "MPEG",
        FileType::Mp4 => "MP4",
        FileType::Opus => "Opus",
        FileType::Vorbis => "Vorbis",
        FileType::Speex => "Speex",
        FileType::Wav => "WAV",
        FileType::WavPack => "WavPack",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_file_is_an_error() {
        let result = read_metadata_blocking(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(MetadataError::FileNotFound(_))));
    }

    #[test]
    fn gain_parsing_tolerates_db_suffix() {
        assert_eq!(parse_gain_db("-6.34 dB"), Some(-6.34));
        assert_eq!(parse_gain_db("-6.34dB"), Some(-6.34));
        assert_eq!(parse_gain_db("2.1"), Some(2.1));
        assert_eq!(parse_gain_db("loud"), None);
    }

    #[tokio::test]
    async fn async_wrapper_propagates_errors() {
        let result = read_metadata(Path::new("/nonexistent/file.flac")).await;
        assert!(result.is_err());
    }
}
