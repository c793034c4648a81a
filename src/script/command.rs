//! One-line console commands, e.g. `bgm_play town 80 100 0 0`.
//!
//! Arguments follow the script call order; trailing ones may be omitted.
//! Names containing spaces can be double-quoted.

use std::str::FromStr;

use super::ScriptError;
use crate::audio::constants::TRACK_ALL;

const DEFAULT_VOLUME: i32 = 100;
const DEFAULT_PITCH: i32 = 100;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BgmPlay {
        name: String,
        volume: i32,
        pitch: i32,
        pos: f64,
        track: i32,
    },
    BgmStop { track: i32 },
    BgmFade { time: i32, track: i32 },
    BgmVolume { track: i32 },
    BgmSetVolume { volume: i32, track: i32 },
    BgmPos { track: i32 },
    BgsPlay {
        name: String,
        volume: i32,
        pitch: i32,
        pos: f64,
    },
    BgsStop,
    BgsFade { time: i32 },
    BgsPos,
    MePlay { name: String, volume: i32, pitch: i32 },
    MeStop,
    MeFade { time: i32 },
    SePlay { name: String, volume: i32, pitch: i32 },
    SeStop,
    /// Query, or set when a value is given.
    BgmGlobal(Option<i32>),
    SfxGlobal(Option<i32>),
    Reset,
    Status,
    Suspend,
    Resume,
    Quit,
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !cur.is_empty() {
                    tokens.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        tokens.push(cur);
    }
    tokens
}

struct Args<'a> {
    command: &'a str,
    rest: std::slice::Iter<'a, String>,
}

impl<'a> Args<'a> {
    fn bad(&self, reason: impl Into<String>) -> ScriptError {
        ScriptError::BadArgument {
            command: self.command.to_string(),
            reason: reason.into(),
        }
    }

    fn name(&mut self) -> Result<String, ScriptError> {
        self.rest
            .next()
            .cloned()
            .ok_or_else(|| self.bad("missing file name"))
    }

    fn opt<T: FromStr>(&mut self, what: &str) -> Result<Option<T>, ScriptError> {
        match self.rest.next() {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| self.bad(format!("invalid {} '{}'", what, raw))),
        }
    }

    fn or<T: FromStr>(&mut self, what: &str, default: T) -> Result<T, ScriptError> {
        Ok(self.opt(what)?.unwrap_or(default))
    }

    fn required<T: FromStr>(&mut self, what: &str) -> Result<T, ScriptError> {
        self.opt(what)?
            .ok_or_else(|| self.bad(format!("missing {}", what)))
    }

    fn done(mut self) -> Result<(), ScriptError> {
        match self.rest.next() {
            None => Ok(()),
            Some(extra) => Err(self.bad(format!("unexpected argument '{}'", extra))),
        }
    }
}

impl FromStr for Command {
    type Err = ScriptError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(line);
        let Some((head, rest)) = tokens.split_first() else {
            return Err(ScriptError::UnknownCommand(String::new()));
        };
        let head = head.to_lowercase();
        let mut a = Args {
            command: &head,
            rest: rest.iter(),
        };

        let cmd = match head.as_str() {
            "bgm_play" => Command::BgmPlay {
                name: a.name()?,
                volume: a.or("volume", DEFAULT_VOLUME)?,
                pitch: a.or("pitch", DEFAULT_PITCH)?,
                pos: a.or("position", 0.0)?,
                track: a.or("track", TRACK_ALL)?,
            },
            "bgm_stop" => Command::BgmStop {
                track: a.or("track", TRACK_ALL)?,
            },
            "bgm_fade" => Command::BgmFade {
                time: a.required("time")?,
                track: a.or("track", TRACK_ALL)?,
            },
            "bgm_volume" => Command::BgmVolume {
                track: a.or("track", TRACK_ALL)?,
            },
            "bgm_set_volume" => Command::BgmSetVolume {
                volume: a.required("volume")?,
                track: a.or("track", TRACK_ALL)?,
            },
            "bgm_pos" => Command::BgmPos {
                track: a.or("track", 0)?,
            },
            "bgs_play" => Command::BgsPlay {
                name: a.name()?,
                volume: a.or("volume", DEFAULT_VOLUME)?,
                pitch: a.or("pitch", DEFAULT_PITCH)?,
                pos: a.or("position", 0.0)?,
            },
            "bgs_stop" => Command::BgsStop,
            "bgs_fade" => Command::BgsFade {
                time: a.required("time")?,
            },
            "bgs_pos" => Command::BgsPos,
            "me_play" => Command::MePlay {
                name: a.name()?,
                volume: a.or("volume", DEFAULT_VOLUME)?,
                pitch: a.or("pitch", DEFAULT_PITCH)?,
            },
            "me_stop" => Command::MeStop,
            "me_fade" => Command::MeFade {
                time: a.required("time")?,
            },
            "se_play" => Command::SePlay {
                name: a.name()?,
                volume: a.or("volume", DEFAULT_VOLUME)?,
                pitch: a.or("pitch", DEFAULT_PITCH)?,
            },
            "se_stop" => Command::SeStop,
            "bgm_global" => Command::BgmGlobal(a.opt("volume")?),
            "sfx_global" => Command::SfxGlobal(a.opt("volume")?),
            "reset" => Command::Reset,
            "status" => Command::Status,
            "suspend" => Command::Suspend,
            "resume" => Command::Resume,
            "quit" | "exit" => Command::Quit,
            _ => return Err(ScriptError::UnknownCommand(head.clone())),
        };

        a.done()?;
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bgm_play() {
        let cmd: Command = "bgm_play town 80 100 1.5 0".parse().unwrap();
        assert_eq!(
            cmd,
            Command::BgmPlay {
                name: "town".into(),
                volume: 80,
                pitch: 100,
                pos: 1.5,
                track: 0,
            }
        );
    }

    #[test]
    fn omitted_arguments_take_defaults() {
        let cmd: Command = "me_play fanfare".parse().unwrap();
        assert_eq!(
            cmd,
            Command::MePlay {
                name: "fanfare".into(),
                volume: 100,
                pitch: 100,
            }
        );
        assert_eq!(
            "bgm_stop".parse::<Command>().unwrap(),
            Command::BgmStop { track: TRACK_ALL }
        );
    }

    #[test]
    fn quoted_names_keep_spaces() {
        let cmd: Command = r#"se_play "Audio/SE/Door Open" 90"#.parse().unwrap();
        assert_eq!(
            cmd,
            Command::SePlay {
                name: "Audio/SE/Door Open".into(),
                volume: 90,
                pitch: 100,
            }
        );
    }

    #[test]
    fn global_volume_query_and_set() {
        assert_eq!("bgm_global".parse::<Command>().unwrap(), Command::BgmGlobal(None));
        assert_eq!(
            "SFX_GLOBAL 40".parse::<Command>().unwrap(),
            Command::SfxGlobal(Some(40))
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(matches!(
            "bgm_fade".parse::<Command>(),
            Err(ScriptError::BadArgument { .. })
        ));
        assert!(matches!(
            "bgm_play town loud".parse::<Command>(),
            Err(ScriptError::BadArgument { .. })
        ));
        assert!(matches!(
            "me_stop now".parse::<Command>(),
            Err(ScriptError::BadArgument { .. })
        ));
        assert!(matches!(
            "dance".parse::<Command>(),
            Err(ScriptError::UnknownCommand(_))
        ));
    }
}
