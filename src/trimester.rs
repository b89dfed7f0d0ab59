use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("fixed calendar date")
}

/// Heuristic only: trimester boundaries vary per school and per year.
/// December 1 and March 1 are an arbitrary middle-of-the-road choice.
pub fn guess_from_date(d: NaiveDate) -> u8 {
    // School years span two calendar years; comparing against midsummer
    // tells us which one the date belongs to.
    let midsummer = ymd(d.year(), 8, 1);
    let (t2_start, t3_start) = if d < midsummer {
        (ymd(d.year() - 1, 12, 1), ymd(d.year(), 3, 1))
    } else {
        (ymd(d.year(), 12, 1), ymd(d.year() + 1, 3, 1))
    };
    if d < t2_start {
        1
    } else if d < t3_start {
        2
    } else {
        3
    }
}

pub fn guess_today() -> u8 {
    guess_from_date(Local::now().date_naive())
}

/// First digit found in a trimester label ("2ème Trimestre" -> 2).
pub fn number_in(label: &str) -> Option<u8> {
    let re = Regex::new(r"\d").unwrap();
    re.find(label)?.as_str().parse().ok()
}

/// Extracts the trimester number from a file name, using the backend's
/// own label pattern (the two portals name their exports differently).
pub fn from_filename(fname: &str, label_pattern: &str) -> Option<u8> {
    let re = Regex::new(label_pattern).ok()?;
    let found = re.find(fname)?;
    number_in(found.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_across_school_year() {
        assert_eq!(guess_from_date(ymd(2022, 9, 15)), 1);
        assert_eq!(guess_from_date(ymd(2022, 11, 30)), 1);
        assert_eq!(guess_from_date(ymd(2022, 12, 1)), 2);
        assert_eq!(guess_from_date(ymd(2023, 2, 15)), 2);
        assert_eq!(guess_from_date(ymd(2023, 3, 1)), 3);
        assert_eq!(guess_from_date(ymd(2023, 6, 20)), 3);
    }

    #[test]
    fn test_from_filename() {
        let axess = r"(?:1er|2ème|3ème) Trimestre";
        assert_eq!(from_filename("MATHTC 1G79 2ème Trimestre.csv", axess), Some(2));
        assert_eq!(from_filename("notes.csv", axess), None);
        let pronote = r"Trimestre (?:1|2|3)";
        assert_eq!(from_filename("1G79_Trimestre 3.csv", pronote), Some(3));
    }
}
