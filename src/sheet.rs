use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use regex::Regex;

use crate::prompt::Prompt;
use crate::trimester;

/// One graded column of the export: title row cell plus the
/// `/<max> - Coef : <coef>` descriptor cell below it.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvEval {
    pub title: String,
    pub col: usize,
    pub max_grade: f64,
    pub coefficient: f64,
}

pub const APPRECIATION_HEADER: &str = "Appréciations générales";

/// The exports use `;` with every cell quoted, but spreadsheet round
/// trips produce `,` or tab files too. Counted on the first line only.
fn sniff_delimiter(contents: &str) -> u8 {
    let first_line = contents.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let candidates = [b';', b',', b'\t'];
    let mut best = b';';
    let mut best_count = 0;
    for c in candidates {
        let count = first_line.bytes().filter(|b| *b == c).count();
        if count > best_count {
            best = c;
            best_count = count;
        }
    }
    best
}

pub fn rows_from_str(contents: &str) -> Result<Vec<Vec<String>>> {
    // The BOM sometimes inserted at the start of exports confuses the
    // first cell otherwise.
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let delimiter = sniff_delimiter(contents);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(contents.as_bytes());
    let mut rows = vec![];
    for record in reader.records() {
        let record = record.map_err(|e| anyhow!("could not parse csv: {}", e))?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(rows)
}

pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let contents = fs::read_to_string(path)
        .map_err(|_| anyhow!("could not read csv file {}", path.display()))?;
    rows_from_str(&contents)
}

/// The group name sits in the top left cell of the export.
pub fn group_name(rows: &[Vec<String>]) -> Result<String> {
    let first = rows.first().and_then(|r| r.first())
        .ok_or_else(|| anyhow!("empty csv file"))?;
    let name = first.trim().replace('"', "").replace('\u{feff}', "");
    if name.is_empty() {
        bail!("no group name in the first cell of the csv file");
    }
    Ok(name)
}

/// Filters the rows that actually carry a student: drops the two header
/// rows and the average/min-max footer the site appends.
pub fn student_rows(rows: &[Vec<String>]) -> Vec<&Vec<String>> {
    let digit = Regex::new(r"\d").unwrap();
    let mut kept = vec![];
    for row in rows.iter().skip(1) {
        let name = match row.first() {
            Some(n) => n.as_str(),
            None => continue,
        };
        if name.ends_with("élèves") || name.trim().is_empty() {
            continue;
        }
        // No digits in names (I hope)
        if digit.is_match(name) {
            continue;
        }
        if name == "Moyenne" || name == "Note min | Note max" || name == "Moy. du groupe :" {
            break;
        }
        kept.push(row);
    }
    kept
}

/// Parses the evaluation descriptors from the second row. Columns
/// without a `/<max> - Coef : <coef>` cell are ignored.
pub fn evaluations(rows: &[Vec<String>]) -> Result<Vec<CsvEval>> {
    if rows.is_empty() {
        bail!("empty csv file");
    }
    if rows.len() < 2 {
        bail!("unexpected csv file format (no second line with evaluation descriptions)");
    }
    let float = r"\d+(?:[.,]\d*)?";
    let desc_re = Regex::new(&format!("/({float}) - Coef : ({float})")).unwrap();
    let mut found: Vec<CsvEval> = vec![];
    for (col, cell) in rows[1].iter().enumerate().skip(1) {
        let caps = match desc_re.captures(cell) {
            Some(c) => c,
            None => continue,
        };
        let max_grade: f64 = caps[1].replace(',', ".").parse().expect("regex-matched float");
        let coefficient: f64 = caps[2].replace(',', ".").parse().expect("regex-matched float");
        let title = rows[0].get(col).map(|s| s.trim()).unwrap_or("");
        if title.is_empty() {
            bail!(
                "detected an evaluation description \"{}\" in column {} but the cell above is empty (expected an evaluation name)",
                cell, col + 1
            );
        }
        if found.iter().any(|e| e.title == title) {
            bail!("evaluation name \"{}\" appears multiple times in the first row of the csv file", title);
        }
        found.push(CsvEval { title: title.to_string(), col, max_grade, coefficient });
    }
    println!(
        "Found {} evaluations in the csv file: {}",
        found.len(),
        found.iter().map(|e| e.title.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(found)
}

/// Column index of the appreciation column.
pub fn appreciation_col(rows: &[Vec<String>]) -> Result<usize> {
    if rows.is_empty() {
        bail!("empty csv file");
    }
    if rows.len() < 2 {
        bail!("unexpected csv file format (no second line with evaluation descriptions)");
    }
    rows[0].iter().position(|cell| cell == APPRECIATION_HEADER)
        .ok_or_else(|| anyhow!("csv file must contain a column named \"{}\"", APPRECIATION_HEADER))
}

/// Numeric cell test. "nan" and friends count as plain text.
pub fn is_number(cell: &str) -> bool {
    float_of(cell).is_some()
}

/// Parses a grade cell as a number, accepting comma decimals.
pub fn float_of(cell: &str) -> Option<f64> {
    let parsed: f64 = cell.trim().replace(',', ".").parse().ok()?;
    if parsed.is_finite() { Some(parsed) } else { None }
}

/// Upload form of a number: integral floats collapse to integers and
/// everything else keeps at most 3 decimals.
pub fn trim_number(f: f64) -> f64 {
    (f * 1000.0).round() / 1000.0
}

pub fn number_string(f: f64) -> String {
    let t = trim_number(f);
    if t == t.trunc() {
        format!("{}", t as i64)
    } else {
        format!("{}", t)
    }
}

/// Json form of a number: the site rejects `2.0` where it expects `2`.
pub fn number_json(f: f64) -> serde_json::Value {
    let t = trim_number(f);
    if t == t.trunc() {
        serde_json::Value::from(t as i64)
    } else {
        serde_json::Value::from(t)
    }
}

/// Display form: integral values without decimals, comma decimals
/// otherwise, plain text untouched.
pub fn comma_number_str(cell: &str) -> String {
    match float_of(cell) {
        None => cell.to_string(),
        Some(f) => number_string(f).replace('.', ","),
    }
}

/// Grades are strings that may or may not be numbers; numeric ones
/// compare by value ("2,0" equals "2"), empty equals empty.
pub fn grades_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (float_of(a), float_of(b)) {
        (Some(fa), Some(fb)) => fa == fb,
        _ => false,
    }
}

fn is_trimester_csv(name: &str, label_pattern: &str) -> bool {
    name.ends_with(".csv") && trimester::from_filename(name, label_pattern).is_some()
}

/// Looks for the export in the working directory. Exports carrying a
/// trimester label win over other csv files; ambiguity falls back to a
/// file dialog.
pub fn find_csv_file(
    ui: &dyn Prompt,
    label_pattern: &str,
    prompt_if_notfound: bool,
    silent: bool,
    confirm: bool,
) -> Result<Option<PathBuf>> {
    let mut found: Option<String> = None;
    let mut multiple = false;
    let cwd = std::env::current_dir().map_err(|_| anyhow!("could not read working directory"))?;
    let mut names: Vec<String> = vec![];
    for entry in fs::read_dir(&cwd).map_err(|_| anyhow!("could not list working directory"))? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".csv") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    for name in names {
        match &found {
            None => found = Some(name),
            Some(current) => {
                if is_trimester_csv(&name, label_pattern) == is_trimester_csv(current, label_pattern) {
                    multiple = true; // keep the current one, no point changing
                } else if is_trimester_csv(&name, label_pattern) {
                    found = Some(name);
                }
            }
        }
    }
    if !prompt_if_notfound {
        if found.is_none() {
            return Ok(None);
        }
        if multiple {
            if !silent {
                println!("Warning: Multiple CSV files found. Proceeding without picking one");
            }
            return Ok(None);
        }
    }
    let mut from_dialog = false;
    let path = match (found, multiple) {
        (None, _) => {
            println!(
                "No csv file specified as an argument, and none found in working directory {}.",
                cwd.display()
            );
            from_dialog = true;
            match ui.open_file("Enter the name of the CSV file:", Some("csv"))? {
                Some(p) => p,
                None => return Ok(None),
            }
        }
        (Some(name), true) => {
            println!(
                "No csv file specified as an argument, and multiple files found in working directory {}.",
                cwd.display()
            );
            let prompt = format!("Enter the name of the CSV file. Default is to use \"{}\":", name);
            match ui.open_file(&prompt, Some("csv"))? {
                Some(p) => p,
                None => PathBuf::from(name),
            }
        }
        (Some(name), false) => PathBuf::from(name),
    };
    if !silent {
        println!("Using csv file {}", path.display());
    }
    if confirm && !from_dialog {
        let keep = ui.confirm_yn(&format!("Use CSV file {}?", path.display()))?;
        if !keep {
            return Ok(None);
        }
    }
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\u{feff}\"MATHTC 1G79\";\"DS1\";\"DM1\";\"Appréciations générales\"\n\
\"24 élèves\";\"/20 - Coef : 1\";\"/10 - Coef : 0,5\";\"\"\n\
\"DUPONT Jean\";\"12,5\";\"8\";\"Bon travail\"\n\
\"MARTIN Luc\";\"\";\"9,5\";\"\"\n\
\"Moyenne\";\"12,5\";\"8,75\";\"\"\n\
\"Note min | Note max\";\"12,5 | 12,5\";\"8 | 9,5\";\"\"\n";

    #[test]
    fn test_rows_and_group_name() {
        let rows = rows_from_str(EXPORT).unwrap();
        assert_eq!(group_name(&rows).unwrap(), "MATHTC 1G79");
        assert_eq!(rows[0][1], "DS1");
    }

    #[test]
    fn test_student_rows_drop_headers_and_footers() {
        let rows = rows_from_str(EXPORT).unwrap();
        let students = student_rows(&rows);
        let names: Vec<&str> = students.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["DUPONT Jean", "MARTIN Luc"]);
    }

    #[test]
    fn test_evaluations_from_descriptor_row() {
        let rows = rows_from_str(EXPORT).unwrap();
        let evals = evaluations(&rows).unwrap();
        assert_eq!(evals.len(), 2);
        assert_eq!(evals[0], CsvEval { title: "DS1".into(), col: 1, max_grade: 20.0, coefficient: 1.0 });
        assert_eq!(evals[1].max_grade, 10.0);
        assert_eq!(evals[1].coefficient, 0.5);
    }

    #[test]
    fn test_evaluation_title_missing_is_an_error() {
        let bad = "\"G\";\"\"\n\"2 élèves\";\"/20 - Coef : 1\"\n";
        let rows = rows_from_str(bad).unwrap();
        assert!(evaluations(&rows).is_err());
    }

    #[test]
    fn test_appreciation_col() {
        let rows = rows_from_str(EXPORT).unwrap();
        assert_eq!(appreciation_col(&rows).unwrap(), 3);
    }

    #[test]
    fn test_comma_delimited_sniffing() {
        let rows = rows_from_str("G,DS1\n\"2 élèves\",/20 - Coef : 1\nDUPONT Jean,15\n").unwrap();
        assert_eq!(rows[0][1], "DS1");
        assert_eq!(rows[2][1], "15");
    }

    #[test]
    fn test_number_forms() {
        assert!(is_number("12,5"));
        assert!(is_number("12.5"));
        assert!(!is_number("ABS"));
        assert!(!is_number("nan"));
        assert_eq!(number_string(2.0), "2");
        assert_eq!(number_string(2.3333333), "2.333");
        assert_eq!(comma_number_str("8.50"), "8,5");
        assert_eq!(comma_number_str("ABS"), "ABS");
        assert_eq!(number_json(20.0), serde_json::json!(20));
    }

    #[test]
    fn test_grades_equal() {
        assert!(grades_equal("2,0", "2"));
        assert!(grades_equal("", ""));
        assert!(!grades_equal("2", "2.1"));
        assert!(!grades_equal("ABS", "2"));
        assert!(grades_equal("ABS", "ABS"));
    }
}
