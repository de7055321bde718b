//! Line-oriented question and answer protocol
//!
//! Every question is written to the output, one line is read from the input
//! and validated. Invalid answers re-prompt with a short retry text. End of
//! input aborts the wizard instead of looping forever.

use crate::error::{EarToolsError, Result};
use std::io::{BufRead, Write};

/// Whether `answer` is made only of decimal digits (surrounding spaces allowed)
pub fn is_numeric(answer: &str) -> bool {
    let trimmed = answer.trim();
    !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Interpret a yes/no answer; empty selects `default`
pub fn parse_yes_no(answer: &str, default: Option<bool>) -> Option<bool> {
    match answer.trim() {
        "" => default,
        "y" | "Y" => Some(true),
        "n" | "N" => Some(false),
        _ => None,
    }
}

/// Interpret a non-negative integer answer; empty selects `default`
pub fn parse_number(answer: &str, default: Option<u64>) -> Option<u64> {
    if answer.trim().is_empty() {
        return default;
    }
    if !is_numeric(answer) {
        return None;
    }
    answer.trim().parse().ok()
}

/// Split a comma separated answer, dropping all spaces
pub fn parse_list(answer: &str) -> Vec<String> {
    let compact: String = answer.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Vec::new();
    }
    compact.split(',').map(str::to_string).collect()
}

/// `[Y/n]`, `[y/N]` or `[y/n]`
fn yes_no_hint(default: Option<bool>) -> &'static str {
    match default {
        Some(true) => "[Y/n]",
        Some(false) => "[y/N]",
        None => "[y/n]",
    }
}

/// Interactive prompter over any line source
pub struct Prompter<R, W> {
    input: R,
    output: W,
    echo: bool,
    answered: usize,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    /// Create a prompter reading answers from `input`
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            echo: false,
            answered: 0,
        }
    }

    /// Echo each answer after its question (useful for scripted answers)
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Number of lines consumed so far
    pub fn answered(&self) -> usize {
        self.answered
    }

    /// Give back the output sink
    pub fn into_output(self) -> W {
        self.output
    }

    /// Print an informational line
    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    /// Print a section banner
    pub fn banner(&mut self, title: &str) -> Result<()> {
        let rule = "=".repeat(title.len() + 4);
        writeln!(self.output, "\n{}\n= {} =\n{}\n", rule, title, rule)?;
        Ok(())
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            let subject = question.trim().trim_end_matches(':').to_string();
            return Err(EarToolsError::PromptAborted(subject));
        }
        self.answered += 1;

        let answer = line.trim_end_matches(['\n', '\r']).to_string();
        if self.echo {
            writeln!(self.output, "{}", answer)?;
        }
        tracing::trace!("answer #{}: {:?}", self.answered, answer);
        Ok(answer)
    }

    /// Ask until a valid answer is given.
    ///
    /// `parse` returns `None` for answers that must be asked again.
    pub fn ask_until<T>(
        &mut self,
        question: &str,
        retry: &str,
        mut parse: impl FnMut(&str) -> Option<T>,
    ) -> Result<T> {
        let mut answer = self.ask(question)?;
        loop {
            if let Some(value) = parse(&answer) {
                return Ok(value);
            }
            answer = self.ask(retry)?;
        }
    }

    /// Yes/no question; the hint is appended to `question`
    pub fn yes_no(&mut self, question: &str, default: Option<bool>) -> Result<bool> {
        let hint = yes_no_hint(default);
        self.ask_until(
            &format!("{} {}: ", question, hint),
            &format!("{}: ", hint),
            |answer| parse_yes_no(answer, default),
        )
    }

    /// Non-negative integer
    pub fn number(&mut self, question: &str, retry: &str, default: Option<u64>) -> Result<u64> {
        let (question, retry) = match default {
            Some(d) => (format!("{} [{}]: ", question, d), format!("{} [{}]: ", retry, d)),
            None => (format!("{}: ", question), format!("{}: ", retry)),
        };
        self.ask_until(&question, &retry, |answer| parse_number(answer, default))
    }

    /// Integer within `range`
    pub fn number_in(
        &mut self,
        question: &str,
        retry: &str,
        default: Option<u64>,
        range: std::ops::RangeInclusive<u64>,
    ) -> Result<u64> {
        let (question, retry) = match default {
            Some(d) => (format!("{} [{}]: ", question, d), format!("{} [{}]: ", retry, d)),
            None => (format!("{}: ", question), format!("{}: ", retry)),
        };
        self.ask_until(&question, &retry, |answer| {
            parse_number(answer, default).filter(|n| range.contains(n))
        })
    }

    /// Free text that must not be purely numeric
    pub fn text(&mut self, question: &str, retry: &str, default: Option<&str>) -> Result<String> {
        let (question, retry) = match default {
            Some(d) => (format!("{} [{}]: ", question, d), format!("{} [{}]: ", retry, d)),
            None => (format!("{}: ", question), format!("{}: ", retry)),
        };
        self.ask_until(&question, &retry, |answer| {
            let trimmed = answer.trim();
            if trimmed.is_empty() {
                default.map(str::to_string)
            } else if is_numeric(trimmed) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    /// Free text that may be empty but not purely numeric
    pub fn optional_text(&mut self, question: &str, retry: &str) -> Result<String> {
        self.ask_until(&format!("{}: ", question), &format!("{}: ", retry), |answer| {
            if is_numeric(answer) {
                None
            } else {
                Some(answer.trim().to_string())
            }
        })
    }

    /// One of `options`, matched exactly
    pub fn choice(
        &mut self,
        question: &str,
        retry: &str,
        options: &[&str],
        default: Option<&str>,
    ) -> Result<String> {
        self.ask_until(question, retry, |answer| {
            let answer = answer.trim();
            if answer.is_empty() {
                return default.map(str::to_string);
            }
            options
                .iter()
                .find(|option| **option == answer)
                .map(|option| option.to_string())
        })
    }

    /// Comma separated list accepted by `valid`; empty selects `default`
    pub fn list(
        &mut self,
        question: &str,
        retry: &str,
        default: Option<&str>,
        valid: impl Fn(&[String]) -> bool,
    ) -> Result<Vec<String>> {
        self.ask_until(question, retry, |answer| {
            let items = if answer.trim().is_empty() {
                parse_list(default?)
            } else {
                parse_list(answer)
            };
            if valid(&items) {
                Some(items)
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_yes_no_default() {
        let mut p = prompter("\n");
        assert!(p.yes_no("Enable", Some(true)).unwrap());
        let mut p = prompter("\n");
        assert!(!p.yes_no("Enable", Some(false)).unwrap());
    }

    #[test]
    fn test_yes_no_retries() {
        let mut p = prompter("maybe\n\nN\n");
        assert!(!p.yes_no("Enable", None).unwrap());
        assert_eq!(p.answered(), 3);
        let out = String::from_utf8(p.into_output()).unwrap();
        assert!(out.starts_with("Enable [y/n]: "));
        assert_eq!(out.matches("[y/n]: ").count(), 3);
    }

    #[test]
    fn test_number_with_default() {
        let mut p = prompter("\n 42 \n");
        assert_eq!(p.number("Port", "Enter a valid port", Some(50001)).unwrap(), 50001);
        assert_eq!(p.number("Port", "Enter a valid port", Some(50001)).unwrap(), 42);
    }

    #[test]
    fn test_number_rejects_text() {
        let mut p = prompter("abc\n-1\n7\n");
        assert_eq!(p.number("Nodes", "Enter a valid number", None).unwrap(), 7);
    }

    #[test]
    fn test_number_in_range() {
        let mut p = prompter("0\n4\n2\n");
        assert_eq!(p.number_in("Mode", "Mode", None, 1..=3).unwrap(), 2);
    }

    #[test]
    fn test_text_rejects_numbers() {
        let mut p = prompter("1234\nnode01\n");
        assert_eq!(p.text("Host", "Enter a valid hostname", Some("nodename")).unwrap(), "node01");
        let mut p = prompter("\n");
        assert_eq!(p.text("Host", "Enter a valid hostname", Some("nodename")).unwrap(), "nodename");
    }

    #[test]
    fn test_choice() {
        let mut p = prompter("x\nK\n");
        let unit = p.choice("Unit: ", "Unit: ", &["J", "K", "M"], None).unwrap();
        assert_eq!(unit, "K");
    }

    #[test]
    fn test_list_validation() {
        let mut p = prompter("1,2\n\n");
        let items = p
            .list("Thresholds: ", "Thresholds: ", Some("85,90,95"), |v| v.len() == 3)
            .unwrap();
        assert_eq!(items, vec!["85", "90", "95"]);
    }

    #[test]
    fn test_end_of_input_aborts() {
        let mut p = prompter("");
        let err = p.number("Nodes", "Enter a valid number", None).unwrap_err();
        assert!(err.is_aborted());

        let mut p = prompter("bad\n");
        assert!(p.yes_no("Enable", None).unwrap_err().is_aborted());
    }

    #[test]
    fn test_echo() {
        let mut p = prompter("y\n").with_echo(true);
        p.yes_no("Enable", None).unwrap();
        let out = String::from_utf8(p.into_output()).unwrap();
        assert_eq!(out, "Enable [y/n]: y\n");
    }

    #[test]
    fn test_parse_list_strips_spaces() {
        assert_eq!(parse_list(" a, b ,c "), vec!["a", "b", "c"]);
        assert!(parse_list("  ").is_empty());
    }

    proptest! {
        #[test]
        fn prop_number_roundtrip(n in 0u64..1_000_000_000u64, pad in 0usize..3) {
            let answer = format!("{}{}{}", " ".repeat(pad), n, " ".repeat(pad));
            prop_assert_eq!(parse_number(&answer, None), Some(n));
        }

        #[test]
        fn prop_alpha_never_numeric(s in "[a-zA-Z_.-][a-zA-Z0-9_.-]{0,12}") {
            prop_assert!(!is_numeric(&s));
            prop_assert_eq!(parse_number(&s, Some(3)), None);
        }

        #[test]
        fn prop_yes_no_only_accepts_letters(s in "\\PC{1,4}") {
            let parsed = parse_yes_no(&s, None);
            let t = s.trim();
            if matches!(t, "y" | "Y" | "n" | "N") {
                prop_assert!(parsed.is_some());
            } else {
                prop_assert!(parsed.is_none());
            }
        }
    }
}
