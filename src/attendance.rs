use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{bail, Result};
use regex::Regex;

use crate::backend::{CalendarEntry, GradeSheet};
use crate::prompt::Prompt;
use crate::sheet;

/// Absences collected per date, then per student.
#[derive(Debug, Default)]
pub struct AttendanceBook {
    pub by_date: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl AttendanceBook {
    pub fn add_calendar(&mut self, student: &str, entries: &[CalendarEntry]) {
        for entry in entries {
            self.by_date
                .entry(entry.date_dmy.clone())
                .or_default()
                .insert(student.to_string(), entry.motives.clone());
        }
    }

    /// The report a teacher reads after a test: per checked student,
    /// the motives recorded on the date, with the grade when known.
    pub fn render(
        &self,
        date: &str,
        group_name: &str,
        eval_name: Option<&str>,
        checked: &[String],
        not_found: &HashSet<String>,
        grades: Option<&HashMap<String, String>>,
    ) -> String {
        let eval_part = eval_name.map(|n| format!(", {}", n)).unwrap_or_default();
        let mut out = format!("**** {} ({}{}):\n\n", date, group_name, eval_part);
        let indent = " ".repeat(4);
        let day = match self.by_date.get(date) {
            Some(day) => day,
            None => {
                out.push_str("Aucunes");
                return out;
            }
        };
        let mut names: Vec<&String> = checked.iter().collect();
        names.sort();
        for name in names {
            match grades.and_then(|g| g.get(name)) {
                Some(grade) => out.push_str(&format!(
                    "{} (note: \"{}\"): \n",
                    name,
                    sheet::comma_number_str(grade)
                )),
                None => out.push_str(&format!("{}: \n", name)),
            }
            if let Some(motives) = day.get(name) {
                for motive in motives {
                    out.push_str(&format!("{}{}\n", indent, motive));
                }
                if !motives.is_empty() {
                    out.push('\n');
                }
            } else if not_found.contains(name) {
                out.push_str(&format!("{}Pas de calendrier d'absences pour cet élève\n", indent));
            }
        }
        out
    }
}

/// A grade worth checking attendance for: empty, non-numeric ("ABS"),
/// or zero.
pub fn should_check_grade(grade: &str) -> bool {
    match sheet::float_of(grade) {
        None => true,
        Some(f) => f == 0.0,
    }
}

/// Students to check from a csv evaluation column, prompting for the
/// evaluation when several are present. Returns (names, grades, title).
pub fn students_from_csv(
    rows: &[Vec<String>],
    eval_name: Option<&str>,
    ui: &dyn Prompt,
) -> Result<(Vec<String>, HashMap<String, String>, String)> {
    let header = match rows.first() {
        Some(h) if h.len() >= 2 => h,
        _ => bail!("CSV file does not contain any evaluations (tests)"),
    };
    let titles: Vec<String> = header[1..]
        .iter()
        .filter(|cell| !cell.trim().is_empty())
        .cloned()
        .collect();
    if titles.is_empty() {
        bail!("CSV file does not contain any evaluations (tests)");
    }
    let title = match eval_name {
        Some(name) => name.to_string(),
        None => ui.pick("Evaluation (test) name not provided. Choose one:", &titles)?,
    };
    let mut col = None;
    for (i, cell) in header.iter().enumerate().skip(1) {
        if *cell == title {
            if col.is_some() {
                bail!("evaluation {} appears more than once in CSV file", title);
            }
            col = Some(i);
        }
    }
    let col = match col {
        Some(c) => c,
        None => bail!("evaluation {} does not appear in CSV file", title),
    };
    let mut to_check = vec![];
    let mut grades = HashMap::new();
    for row in sheet::student_rows(rows) {
        let name = row[0].clone();
        let grade = row.get(col).cloned().unwrap_or_default();
        if should_check_grade(&grade) {
            to_check.push(name.clone());
        }
        grades.insert(name, grade);
    }
    Ok((to_check, grades, title))
}

/// Same selection from the server's grade sheet for a known evaluation.
pub fn students_from_sheet(
    server: &GradeSheet,
    eval_id: &str,
) -> Result<(Vec<String>, HashMap<String, String>)> {
    let mut to_check = vec![];
    let mut grades = HashMap::new();
    for student in &server.students {
        let grade = match server.grade_of(eval_id, &student.id) {
            Some(g) => g.to_string(),
            None => bail!(
                "unexpected website response (valid student id has no grade for evaluation id {})",
                eval_id
            ),
        };
        if should_check_grade(&grade) {
            to_check.push(student.name.clone());
        }
        grades.insert(student.name.clone(), grade);
    }
    Ok((to_check, grades))
}

/// "2024-01-12" -> "12/01/2024".
pub fn date_dmy_of_ymd(date_ymd: &str) -> String {
    let re = Regex::new(r"^(\d\d\d\d)-(\d\d)-(\d\d)$").unwrap();
    re.replace(date_ymd, "$3/$2/$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::MemoryPrompt;

    #[test]
    fn test_should_check_grade() {
        assert!(should_check_grade(""));
        assert!(should_check_grade("ABS"));
        assert!(should_check_grade("0"));
        assert!(!should_check_grade("0,5"));
        assert!(!should_check_grade("12"));
    }

    #[test]
    fn test_date_dmy_of_ymd() {
        assert_eq!(date_dmy_of_ymd("2024-01-12"), "12/01/2024");
        assert_eq!(date_dmy_of_ymd("12/01/2024"), "12/01/2024");
    }

    #[test]
    fn test_students_from_csv_picks_column() {
        let rows = vec![
            vec!["1G79".to_string(), "DS1".to_string(), "DS2".to_string()],
            vec!["3 élèves".to_string(), "/20 - Coef : 1".to_string(), "/20 - Coef : 1".to_string()],
            vec!["DUPONT Jean".to_string(), "0".to_string(), "15".to_string()],
            vec!["MARTIN Luc".to_string(), "ABS".to_string(), "".to_string()],
            vec!["PETIT Zoé".to_string(), "14".to_string(), "9".to_string()],
        ];
        let ui = MemoryPrompt::new(&[]);
        let (to_check, grades, title) = students_from_csv(&rows, Some("DS1"), &ui).unwrap();
        assert_eq!(title, "DS1");
        assert_eq!(to_check, vec!["DUPONT Jean".to_string(), "MARTIN Luc".to_string()]);
        assert_eq!(grades["PETIT Zoé"], "14");
    }

    #[test]
    fn test_students_from_csv_prompts_for_title() {
        let rows = vec![
            vec!["1G79".to_string(), "DS1".to_string(), "DS2".to_string()],
            vec!["3 élèves".to_string(), "".to_string(), "".to_string()],
            vec!["DUPONT Jean".to_string(), "".to_string(), "1".to_string()],
        ];
        let ui = MemoryPrompt::new(&["DS2"]);
        let (to_check, _, title) = students_from_csv(&rows, None, &ui).unwrap();
        assert_eq!(title, "DS2");
        assert!(to_check.is_empty());
    }

    #[test]
    fn test_render_report() {
        let mut book = AttendanceBook::default();
        book.add_calendar(
            "MARTIN Luc",
            &[CalendarEntry {
                date_dmy: "12/01/2024".into(),
                motives: vec!["De 10h10 à 11h00 - Maladie".into()],
            }],
        );
        let checked = vec!["MARTIN Luc".to_string(), "DUPONT Jean".to_string()];
        let mut not_found = HashSet::new();
        not_found.insert("DUPONT Jean".to_string());
        let mut grades = HashMap::new();
        grades.insert("MARTIN Luc".to_string(), "ABS".to_string());
        grades.insert("DUPONT Jean".to_string(), "0".to_string());
        let out = book.render("12/01/2024", "1G79", Some("DS1"), &checked, &not_found, Some(&grades));
        assert!(out.starts_with("**** 12/01/2024 (1G79, DS1):"));
        // Students come out sorted.
        let dupont = out.find("DUPONT Jean").unwrap();
        let martin = out.find("MARTIN Luc").unwrap();
        assert!(dupont < martin);
        assert!(out.contains("MARTIN Luc (note: \"ABS\"): \n    De 10h10 à 11h00 - Maladie"));
        assert!(out.contains("Pas de calendrier d'absences pour cet élève"));
    }

    #[test]
    fn test_render_no_absences_for_date() {
        let book = AttendanceBook::default();
        let out = book.render("12/01/2024", "1G79", None, &[], &HashSet::new(), None);
        assert!(out.ends_with("Aucunes"));
    }
}
