const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub commit_short: &'static str,
    pub build_time: &'static str,
    pub profile: &'static str,
    pub output: String,
    pub bgm_tracks: usize,
}

impl BannerInfo {
    pub fn new(output: impl Into<String>, bgm_tracks: usize) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit_short: env_or!("GIT_COMMIT_SHORT", "unknown"),
            build_time: env_or!("BUILD_TIME_HUMAN", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
            output: output.into(),
            bgm_tracks,
        }
    }
}

pub fn print_banner(info: &BannerInfo) {
    crate::log_println!();
    crate::log_println!("{GREEN}  rgss-audio{RESET} {DIM}streaming BGM / BGS / ME / SE{RESET}");
    crate::log_println!("{DIM}========================================{RESET}");

    print_row("Version", info.version, CYAN);
    print_row("Branch", info.branch, RESET);
    print_row("Commit", info.commit_short, RESET);
    print_row("Build time", info.build_time, RESET);
    print_row("Profile", info.profile, YELLOW);
    print_row("Output", &info.output, RESET);
    print_row("BGM tracks", &info.bgm_tracks.to_string(), RESET);
    crate::log_println!();
}

fn print_row(label: &str, value: &str, color: &str) {
    crate::log_println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_time_is_a_calendar_timestamp() {
        let info = BannerInfo::new("headless", 1);
        assert!(
            info.build_time.ends_with(" UTC"),
            "unexpected build time {:?}",
            info.build_time
        );
        let date = &info.build_time[..10];
        assert_eq!(date.as_bytes()[4], b'-');
        assert_eq!(date.as_bytes()[7], b'-');
        assert!(!info.build_time.chars().all(|c| c.is_ascii_digit()));
    }
}
