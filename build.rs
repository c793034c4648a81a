use std::{path::Path, process::Command, time::SystemTime};

fn main() {
  let secs = SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0);
  println!("cargo:rustc-env=BUILD_TIME_HUMAN={}", format_utc(secs));

  println!("cargo:rerun-if-changed=.git/HEAD");
  if Path::new(".git/refs/heads").exists() {
    println!("cargo:rerun-if-changed=.git/refs/heads");
  }

  let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_else(|| "unknown".into());
  let commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());

  println!("cargo:rustc-env=GIT_BRANCH={}", branch);
  println!("cargo:rustc-env=GIT_COMMIT_SHORT={}", commit);
}

fn git(args: &[&str]) -> Option<String> {
  let output = Command::new("git").args(args).output().ok()?;
  if !output.status.success() {
    return None;
  }
  let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if value.is_empty() { None } else { Some(value) }
}

/// `YYYY-MM-DD HH:MM:SS UTC` for a unix timestamp.
fn format_utc(secs: u64) -> String {
  let days = (secs / 86_400) as i64;
  let rem = secs % 86_400;

  // days-to-civil over 400-year eras, epoch shifted to 0000-03-01
  let z = days + 719_468;
  let era = z.div_euclid(146_097);
  let doe = z.rem_euclid(146_097);
  let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
  let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
  let mp = (5 * doy + 2) / 153;
  let day = doy - (153 * mp + 2) / 5 + 1;
  let month = if mp < 10 { mp + 3 } else { mp - 9 };
  let year = yoe + era * 400 + i64::from(month <= 2);

  format!(
    "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
    year,
    month,
    day,
    rem / 3_600,
    (rem % 3_600) / 60,
    rem % 60
  )
}
