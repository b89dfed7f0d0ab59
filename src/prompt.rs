use std::cell::RefCell;
use std::collections::VecDeque;
use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use dialoguer::{Confirm, Input, Password, Select};
use regex::Regex;

/// A Prompt is one channel for asking the operator something. The tools
/// never read stdin directly; everything goes through this trait so the
/// dialog and terminal front ends stay interchangeable.
pub trait Prompt {
  fn text(&self, prompt: &str) -> Result<String>;
  fn password(&self, prompt: &str) -> Result<String>;
  fn pick(&self, prompt: &str, options: &[String]) -> Result<String>;
  /// Yes/no question defaulting to yes.
  fn confirm_yn(&self, prompt: &str) -> Result<bool>;
  /// Yes/no question defaulting to no.
  fn confirm_ny(&self, prompt: &str) -> Result<bool>;
  fn open_file(&self, prompt: &str, extension: Option<&str>) -> Result<Option<PathBuf>>;
  fn save_file(&self, prompt: &str, extension: Option<&str>) -> Result<Option<PathBuf>>;

  fn message(&self, text: &str) {
    println!("{}", text);
  }

  /// Asks until a DD/MM/YYYY date is given, returned zero-padded.
  fn date_dmy(&self, prompt: &str) -> Result<String> {
    loop {
      let answer = self.text(&format!("{} Format is DD/MM/YYYY.", prompt))?;
      if let Some((d, m, y)) = parse_date_dmy(&answer) {
        return Ok(format!("{:02}/{:02}/{:04}", d, m, y));
      }
      println!("Invalid date format");
    }
  }

  /// Asks for an HH:MM time; an empty answer means "no time".
  fn time_hhmm(&self, prompt: &str) -> Result<Option<String>> {
    loop {
      let answer = self.text(&format!("{} Format is HH:MM.", prompt))?;
      if answer.trim().is_empty() {
        return Ok(None);
      }
      if let Some((h, m)) = parse_time_hhmm(&answer) {
        return Ok(Some(format!("{:02}:{:02}", h, m)));
      }
      println!("Invalid time format. Format is HH:MM");
    }
  }
}

pub fn parse_date_dmy(s: &str) -> Option<(u32, u32, i32)> {
  let re = Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{1,4})").unwrap();
  let caps = re.captures(s)?;
  let day: u32 = caps[1].parse().ok()?;
  let month: u32 = caps[2].parse().ok()?;
  let mut year: i32 = caps[3].parse().ok()?;
  if year < 100 {
    year += 2000;
  }
  if day == 0 || day > 31 || month == 0 || month > 12 {
    return None;
  }
  Some((day, month, year))
}

pub fn parse_time_hhmm(s: &str) -> Option<(u8, u8)> {
  let re = Regex::new(r"(\d{1,2})(:|h)(\d{1,2})").unwrap();
  let caps = re.captures(s)?;
  let hour: u8 = caps[1].parse().ok()?;
  let minute: u8 = caps[3].parse().ok()?;
  if hour > 23 || minute > 59 {
    return None;
  }
  Some((hour, minute))
}

/// Plain terminal prompts. This is what `--cli` selects.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
  fn text(&self, prompt: &str) -> Result<String> {
    Ok(Input::new().with_prompt(prompt).allow_empty(true).interact_text()?)
  }

  fn password(&self, prompt: &str) -> Result<String> {
    Ok(Password::new().with_prompt(prompt).interact()?)
  }

  fn pick(&self, prompt: &str, options: &[String]) -> Result<String> {
    if options.is_empty() {
      return Err(anyhow!("nothing to choose from"));
    }
    let i = Select::new().with_prompt(prompt).items(options).default(0).interact()?;
    Ok(options[i].clone())
  }

  fn confirm_yn(&self, prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(true).interact()?)
  }

  fn confirm_ny(&self, prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
  }

  fn open_file(&self, prompt: &str, _extension: Option<&str>) -> Result<Option<PathBuf>> {
    let answer = self.text(prompt)?;
    if answer.trim().is_empty() {
      return Ok(None);
    }
    let path = PathBuf::from(answer.trim());
    if !path.is_file() {
      println!("File {} does not exist", path.display());
      return Ok(None);
    }
    Ok(Some(path))
  }

  fn save_file(&self, prompt: &str, _extension: Option<&str>) -> Result<Option<PathBuf>> {
    let answer = self.text(prompt)?;
    if answer.trim().is_empty() {
      return Ok(None);
    }
    Ok(Some(PathBuf::from(answer.trim())))
  }
}

/// Terminal prompts with native file dialogs for picking files. This is
/// the default front end.
pub struct DialogPrompt {
  console: ConsolePrompt,
}

impl DialogPrompt {
  pub fn new() -> Self {
    Self { console: ConsolePrompt }
  }
}

impl Default for DialogPrompt {
  fn default() -> Self {
    Self::new()
  }
}

impl Prompt for DialogPrompt {
  fn text(&self, prompt: &str) -> Result<String> {
    self.console.text(prompt)
  }

  fn password(&self, prompt: &str) -> Result<String> {
    self.console.password(prompt)
  }

  fn pick(&self, prompt: &str, options: &[String]) -> Result<String> {
    self.console.pick(prompt, options)
  }

  fn confirm_yn(&self, prompt: &str) -> Result<bool> {
    self.console.confirm_yn(prompt)
  }

  fn confirm_ny(&self, prompt: &str) -> Result<bool> {
    self.console.confirm_ny(prompt)
  }

  fn open_file(&self, prompt: &str, extension: Option<&str>) -> Result<Option<PathBuf>> {
    let mut dialog = rfd::FileDialog::new().set_title(prompt);
    if let Ok(cwd) = env::current_dir() {
      dialog = dialog.set_directory(cwd);
    }
    if let Some(ext) = extension {
      dialog = dialog.add_filter(ext, &[ext]).add_filter("all files", &["*"]);
    }
    Ok(dialog.pick_file())
  }

  fn save_file(&self, prompt: &str, extension: Option<&str>) -> Result<Option<PathBuf>> {
    let mut dialog = rfd::FileDialog::new().set_title(prompt);
    if let Ok(cwd) = env::current_dir() {
      dialog = dialog.set_directory(cwd);
    }
    if let Some(ext) = extension {
      dialog = dialog.add_filter(ext, &[ext]).add_filter("all files", &["*"]);
    }
    Ok(dialog.save_file())
  }
}

/// Scripted prompt for tests: pops prepared answers and records what was
/// asked.
pub struct MemoryPrompt {
  answers: RefCell<VecDeque<String>>,
  asked: RefCell<Vec<String>>,
}

impl MemoryPrompt {
  pub fn new(answers: &[&str]) -> Self {
    Self {
      answers: RefCell::new(answers.iter().map(|s| s.to_string()).collect()),
      asked: RefCell::new(Vec::new()),
    }
  }

  pub fn asked(&self) -> Vec<String> {
    self.asked.borrow().clone()
  }

  fn pop(&self, prompt: &str) -> Result<String> {
    self.asked.borrow_mut().push(prompt.to_string());
    self.answers.borrow_mut().pop_front()
      .ok_or_else(|| anyhow!("no scripted answer left for prompt: {}", prompt))
  }
}

impl Prompt for MemoryPrompt {
  fn text(&self, prompt: &str) -> Result<String> {
    self.pop(prompt)
  }

  fn password(&self, prompt: &str) -> Result<String> {
    self.pop(prompt)
  }

  fn pick(&self, prompt: &str, options: &[String]) -> Result<String> {
    let answer = self.pop(prompt)?;
    if options.contains(&answer) {
      Ok(answer)
    } else {
      Err(anyhow!("scripted answer {} is not among the options", answer))
    }
  }

  fn confirm_yn(&self, prompt: &str) -> Result<bool> {
    Ok(self.pop(prompt)? != "n")
  }

  fn confirm_ny(&self, prompt: &str) -> Result<bool> {
    Ok(self.pop(prompt)? == "y")
  }

  fn open_file(&self, prompt: &str, _extension: Option<&str>) -> Result<Option<PathBuf>> {
    let answer = self.pop(prompt)?;
    if answer.is_empty() { Ok(None) } else { Ok(Some(PathBuf::from(answer))) }
  }

  fn save_file(&self, prompt: &str, _extension: Option<&str>) -> Result<Option<PathBuf>> {
    let answer = self.pop(prompt)?;
    if answer.is_empty() { Ok(None) } else { Ok(Some(PathBuf::from(answer))) }
  }

  fn message(&self, text: &str) {
    self.asked.borrow_mut().push(format!("[message] {}", text));
  }
}

/// Front end selection: `--cli` forces plain terminal prompts.
pub fn ui(cli: bool) -> Box<dyn Prompt> {
  if cli {
    Box::new(ConsolePrompt)
  } else {
    Box::new(DialogPrompt::new())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_date_dmy() {
    assert_eq!(parse_date_dmy("3/9/2023"), Some((3, 9, 2023)));
    assert_eq!(parse_date_dmy("03/09/23"), Some((3, 9, 2023)));
    assert_eq!(parse_date_dmy("32/01/2023"), None);
    assert_eq!(parse_date_dmy("monday"), None);
  }

  #[test]
  fn test_parse_time_hhmm() {
    assert_eq!(parse_time_hhmm("8h05"), Some((8, 5)));
    assert_eq!(parse_time_hhmm("14:30"), Some((14, 30)));
    assert_eq!(parse_time_hhmm("25:00"), None);
    assert_eq!(parse_time_hhmm(""), None);
  }

  #[test]
  fn test_memory_prompt_scripts_answers() {
    let p = MemoryPrompt::new(&["alice", "n"]);
    assert_eq!(p.text("Username:").unwrap(), "alice");
    assert!(!p.confirm_yn("Continue?").unwrap());
    assert_eq!(p.asked().len(), 2);
    assert!(p.text("again").is_err());
  }

  #[test]
  fn test_memory_prompt_date_loop_normalizes() {
    let p = MemoryPrompt::new(&["9/1/24"]);
    assert_eq!(p.date_dmy("Enter the date.").unwrap(), "09/01/2024");
  }
}
