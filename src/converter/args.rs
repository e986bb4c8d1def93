use std::ffi::OsString;
use std::path::Path;

/// Arguments for one ffmpeg run. mp3 and m4a get explicit encoder flags;
/// any other format is left to ffmpeg to infer from the output extension.
pub fn build_ffmpeg_args(
    input: &Path,
    output: &Path,
    format: &str,
    bitrate: &str,
    codec: Option<&str>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into(), "-y".into()];

    match format.to_lowercase().as_str() {
        "mp3" => {
            args.extend(
                [
                    "-codec:a",
                    "libmp3lame",
                    "-b:a",
                    bitrate,
                    "-map",
                    "0:a",
                    "-id3v2_version",
                    "3",
                ]
                .map(OsString::from),
            );
        }
        "m4a" => {
            let codec = codec.filter(|c| !c.is_empty()).unwrap_or("aac");
            if codec.eq_ignore_ascii_case("alac") {
                args.extend(["-codec:a", "alac", "-map", "0:a"].map(OsString::from));
            } else {
                args.extend(
                    ["-codec:a", "aac", "-b:a", bitrate, "-map", "0:a"].map(OsString::from),
                );
            }
        }
        _ => {}
    }

    args.push(output.into());
    args
}
