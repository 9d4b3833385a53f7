//! Replay script format.
//!
//! One step per line. Blank lines and `#` comments are skipped. Names in
//! `drag` and `rename` are percent-decoded, so `Stone%20Walls` works.
//!
//! ```text
//! # form messages are replayed verbatim
//! updateelements:update?data=%7B...%7D
//! pick 1 2          # answer the next geometry pick with handles g1, g2
//! cancel            # cancel the next geometry pick
//! geometryupdate:geo?Wall1,200
//! drag Wall1_Thickness 80
//! rename Wall1 Wall2
//! undo
//! redo
//! ```

use efm_core::model::GeometryHandle;
use efm_sync::bridge::percent_decode;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A navigation message from the form.
    Message(String),
    Pick(Vec<GeometryHandle>),
    CancelPick,
    /// Drag a slider node on the canvas to a value.
    Drag { slider: String, value: f64 },
    Rename { old: String, new: String },
    Undo,
    Redo,
}

pub fn parse_script(text: &str) -> Result<Vec<Step>, String> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.split_once(" #").map_or(line, |(code, _)| code).trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else {
                Some(parse_step(line).map_err(|e| format!("line {}: {e}", i + 1)))
            }
        })
        .collect()
}

fn parse_step(line: &str) -> Result<Step, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty step".into());
    };
    let args: Vec<&str> = words.collect();

    match (head, args.as_slice()) {
        ("undo", []) => Ok(Step::Undo),
        ("redo", []) => Ok(Step::Redo),
        ("cancel", []) => Ok(Step::CancelPick),
        ("pick", handles) if !handles.is_empty() => handles
            .iter()
            .map(|h| {
                h.trim_start_matches('g')
                    .parse::<u64>()
                    .map(GeometryHandle)
                    .map_err(|_| format!("`{h}` is not a geometry handle"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Step::Pick),
        ("drag", [slider, value]) => {
            let value = value
                .parse::<f64>()
                .map_err(|_| format!("`{value}` is not a number"))?;
            Ok(Step::Drag {
                slider: name(slider)?,
                value,
            })
        }
        ("rename", [old, new]) => Ok(Step::Rename {
            old: name(old)?,
            new: name(new)?,
        }),
        (head, []) if head.contains(':') => Ok(Step::Message(head.to_string())),
        _ => Err(format!("unrecognised step `{line}`")),
    }
}

fn name(word: &str) -> Result<String, String> {
    percent_decode(word).map_err(|e| e.to_string())
}
