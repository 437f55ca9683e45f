use std::io::{self, BufRead, Write};
use std::time::Instant;

/// Elapsed time since `start` as `HH:MM:SS`.
pub fn format_hms(start: &Instant) -> String {
    let secs = start.elapsed().as_secs();
    hms(secs)
}

fn hms(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Asks a yes/no question on stdout and reads the answer from `input`. Anything but y/yes is no.
pub fn confirm<R: BufRead>(question: &str, input: &mut R) -> io::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hms() {
        assert_eq!(hms(0), "00:00:00");
        assert_eq!(hms(3_725), "01:02:05");
    }

    #[test]
    fn test_confirm_answers() {
        assert!(confirm("Submit?", &mut "y\n".as_bytes()).unwrap());
        assert!(confirm("Submit?", &mut " YES \n".as_bytes()).unwrap());
        assert!(!confirm("Submit?", &mut "\n".as_bytes()).unwrap());
        assert!(!confirm("Submit?", &mut "".as_bytes()).unwrap());
    }
}
