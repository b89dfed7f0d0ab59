use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use regex::Regex;

use crate::backend::{Backend, EvalId, GradeChanges, GradeSheet, Group, StudentId};
use crate::prompt::Prompt;
use crate::sheet::{self, CsvEval};

/// CSV rows keyed by the server student they matched, plus what failed
/// to match on either side.
#[derive(Debug, Default)]
pub struct StudentMatch {
    pub rows: BTreeMap<StudentId, Vec<String>>,
    pub unmatched_csv: Vec<String>,
    pub unmatched_server: Vec<String>,
}

impl StudentMatch {
    pub fn mismatched(&self) -> bool {
        !self.unmatched_csv.is_empty() || !self.unmatched_server.is_empty()
    }

    pub fn report(&self) {
        println!("Matched {} students from website to csv.", self.rows.len());
        if !self.unmatched_server.is_empty() {
            println!("Warning: Not all students from website matched to names in csv file");
            println!("*** Students from website not matched:");
            for name in &self.unmatched_server {
                println!("{}", name);
            }
            println!("***");
        }
        if !self.unmatched_csv.is_empty() {
            println!("Warning: Not all lines from csv matched to names on the website");
            println!("*** Lines from csv not matched:");
            for name in &self.unmatched_csv {
                println!("{}", name);
            }
            println!("***");
        }
    }
}

/// Matches csv student rows to server students by exact name. Cells
/// with digits are probably not names and don't count as unmatched.
pub fn match_students(server: &GradeSheet, rows: &[&Vec<String>]) -> StudentMatch {
    let digit = Regex::new(r"[0-9]").unwrap();
    let mut id_of_name: HashMap<String, StudentId> =
        server.students.iter().map(|s| (s.name.clone(), s.id.clone())).collect();
    let mut matched = StudentMatch::default();
    for row in rows {
        let name = match row.first() {
            Some(n) => n.as_str(),
            None => continue,
        };
        match id_of_name.remove(name) {
            Some(id) => {
                matched.rows.insert(id, (*row).clone());
            }
            None => {
                if digit.is_match(name) {
                    continue;
                }
                matched.unmatched_csv.push(name.to_string());
            }
        }
    }
    matched.unmatched_server = id_of_name.into_keys().collect();
    matched.unmatched_server.sort();
    matched
}

/// A csv evaluation paired with its server id.
#[derive(Debug, Clone)]
pub struct PairedEval {
    pub title: String,
    pub col: usize,
    pub max_grade: f64,
    pub coefficient: f64,
    pub id: EvalId,
}

/// Pairs csv evaluations with the server's, creating the missing ones
/// when allowed and offering to push changed max grades/coefficients.
/// Returns whether anything was created (the sheet must be fetched
/// again in that case).
pub fn pair_evaluations(
    backend: &mut dyn Backend,
    ui: &dyn Prompt,
    group: &Group,
    trimester: u8,
    server: &GradeSheet,
    csv_evals: &[CsvEval],
    create_missing: bool,
    hidden: bool,
) -> Result<(bool, Vec<PairedEval>)> {
    let mut created = false;
    let mut paired = vec![];
    let mut missing: Vec<&CsvEval> = vec![];
    let mut changed_desc: Vec<(&CsvEval, &crate::backend::Evaluation)> = vec![];
    let mut not_in_csv: Vec<&str> = server
        .evaluations
        .iter()
        .filter(|e| !csv_evals.iter().any(|c| c.title == e.title))
        .map(|e| e.title.as_str())
        .collect();
    not_in_csv.sort();
    for csv_eval in csv_evals {
        match server.evaluation_titled(&csv_eval.title) {
            Some(web_eval) => {
                paired.push(PairedEval {
                    title: csv_eval.title.clone(),
                    col: csv_eval.col,
                    max_grade: csv_eval.max_grade,
                    coefficient: csv_eval.coefficient,
                    id: web_eval.id.clone(),
                });
                if web_eval.max_grade != csv_eval.max_grade
                    || web_eval.coefficient != csv_eval.coefficient
                {
                    changed_desc.push((csv_eval, web_eval));
                }
            }
            None => missing.push(csv_eval),
        }
    }
    if !not_in_csv.is_empty() {
        println!(
            "WARNING: {} evaluation(s) are present on the website but not in the csv file: {}",
            not_in_csv.len(),
            not_in_csv.join(", ")
        );
    }
    if !missing.is_empty() {
        println!(
            "Found {} evaluation(s) not present on the website: {}",
            missing.len(),
            missing.iter().map(|e| e.title.as_str()).collect::<Vec<_>>().join(", ")
        );
        if create_missing {
            for (i, csv_eval) in missing.iter().enumerate() {
                if i > 0 {
                    // Light pacing between creation requests.
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                let id = backend.create_evaluation(
                    group,
                    trimester,
                    &csv_eval.title,
                    csv_eval.max_grade,
                    csv_eval.coefficient,
                    hidden,
                )?;
                paired.push(PairedEval {
                    title: csv_eval.title.clone(),
                    col: csv_eval.col,
                    max_grade: csv_eval.max_grade,
                    coefficient: csv_eval.coefficient,
                    id,
                });
                created = true;
            }
            if created {
                println!("Evaluation(s) successfully created. Note that their creation date has been set to today.");
            }
        }
    }
    if !changed_desc.is_empty() {
        println!(
            "Found {} evaluation(s) with max grade or coefficient different than on the website: {}",
            changed_desc.len(),
            changed_desc.iter().map(|(c, _)| c.title.as_str()).collect::<Vec<_>>().join(", ")
        );
        let push = ui.confirm_yn(&format!(
            "Upload the modified max grades and coefficients? ({} evaluation(s) will be modified.)",
            changed_desc.len()
        ))?;
        if push {
            for (i, (csv_eval, web_eval)) in changed_desc.iter().enumerate() {
                if i > 0 {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                backend.update_evaluation(
                    group,
                    trimester,
                    web_eval,
                    csv_eval.max_grade,
                    csv_eval.coefficient,
                )?;
            }
        }
    }
    Ok((created, paired))
}

/// What one evaluation's upload would do, for the confirmation dialog.
#[derive(Debug, Default)]
pub struct EvalChanges {
    pub title: String,
    pub writes: Vec<StudentId>,
    pub overwrites: Vec<StudentId>,
    pub deletes: Vec<StudentId>,
}

#[derive(Debug, Default)]
pub struct UploadPlan {
    pub per_eval: Vec<EvalChanges>,
    pub changes: GradeChanges,
    pub warnings: Vec<String>,
}

impl UploadPlan {
    pub fn write_count(&self) -> usize {
        self.per_eval.iter().map(|e| e.writes.len()).sum()
    }

    pub fn overwrite_count(&self) -> usize {
        self.per_eval.iter().map(|e| e.overwrites.len()).sum()
    }

    pub fn delete_count(&self) -> usize {
        self.per_eval.iter().map(|e| e.deletes.len()).sum()
    }
}

/// Classifies every differing cell as a write, overwrite or delete.
/// Values equal as floats or strings are skipped; grades above the
/// evaluation max are clipped to it.
pub fn plan_grades(
    server: &GradeSheet,
    matched: &StudentMatch,
    evals: &[PairedEval],
    never_delete: bool,
) -> UploadPlan {
    let mut plan = UploadPlan::default();
    for eval in evals {
        let mut eval_changes = EvalChanges { title: eval.title.clone(), ..Default::default() };
        for (student_id, row) in &matched.rows {
            let mut grade_csv = row.get(eval.col).cloned().unwrap_or_default();
            if let Some(g) = sheet::float_of(&grade_csv) {
                if g > eval.max_grade {
                    plan.warnings.push(format!(
                        "In evaluation \"{}\", grade \"{}\" in csv file is greater than the maximum grade of {}. Replacing it with {}",
                        eval.title, grade_csv, sheet::number_string(eval.max_grade), sheet::number_string(eval.max_grade)
                    ));
                    grade_csv = sheet::number_string(eval.max_grade);
                }
            }
            if let Some(grade_web) = server.grade_of(&eval.id, student_id) {
                if sheet::grades_equal(grade_web, &grade_csv) {
                    // Don't fill the request with overwrites of the
                    // existing values.
                    continue;
                }
                if grade_csv.is_empty() {
                    eval_changes.deletes.push(student_id.clone());
                    if never_delete {
                        continue;
                    }
                } else if !grade_web.is_empty() {
                    eval_changes.overwrites.push(student_id.clone());
                }
            }
            eval_changes.writes.push(student_id.clone());
            plan.changes
                .entry(eval.id.clone())
                .or_insert_with(BTreeMap::new)
                .insert(student_id.clone(), grade_csv);
        }
        plan.per_eval.push(eval_changes);
    }
    plan
}

/// Appreciation changes: one column, keyed by student. Empty csv cells
/// are skipped, so nothing is ever deleted here.
#[derive(Debug, Default)]
pub struct ApprPlan {
    pub writes: Vec<StudentId>,
    pub overwrites: Vec<StudentId>,
    pub changes: Vec<(StudentId, String)>,
}

pub fn plan_appreciations(
    web: &HashMap<StudentId, String>,
    matched: &StudentMatch,
    col: usize,
) -> ApprPlan {
    let mut plan = ApprPlan::default();
    for (student_id, row) in &matched.rows {
        let appr_csv = row.get(col).map(|s| s.trim()).unwrap_or_default();
        if appr_csv.is_empty() {
            continue;
        }
        let appr_web = web.get(student_id).map(String::as_str).unwrap_or("");
        if appr_csv == appr_web {
            continue;
        }
        if !appr_web.is_empty() {
            plan.overwrites.push(student_id.clone());
        }
        plan.writes.push(student_id.clone());
        plan.changes.push((student_id.clone(), appr_csv.to_string()));
    }
    plan
}

/// Preview of the students a change touches, 4 names then an ellipsis.
pub fn students_preview(names: &HashMap<StudentId, String>, ids: &[StudentId]) -> String {
    let mut shown: Vec<String> = ids
        .iter()
        .map(|id| names.get(id).cloned().unwrap_or_else(|| id.clone()))
        .collect();
    if shown.len() > 4 {
        shown.truncate(4);
        shown.push("...".to_string());
    }
    format!("For student(s): {}", shown.join(", "))
}

/// The confirmation dialog before any upload. Returns whether to go on.
pub fn confirm_upload(
    ui: &dyn Prompt,
    thing: &str,
    write_count: usize,
    overwrite_count: usize,
    delete_count: usize,
    ask_to_write: bool,
    ask_to_delete: bool,
) -> Result<bool> {
    let mut dialog = String::new();
    if delete_count + overwrite_count > 0 && ask_to_delete {
        dialog.push_str(&format!("Uploading {}s will ", thing));
        if delete_count > 0 {
            dialog.push_str(&format!("DELETE {}", delete_count));
        }
        if delete_count > 0 && overwrite_count > 0 {
            dialog.push_str(" and ");
        }
        if overwrite_count > 0 {
            dialog.push_str(&format!("OVERWRITE {}", overwrite_count));
        }
        dialog.push_str(&format!(" {}(s) on the website.\n", thing));
    }
    if ask_to_write {
        dialog.push_str(&format!("Uploading will write {} {}(s) to the website.\n", write_count, thing));
    }
    if dialog.is_empty() {
        return Ok(true);
    }
    dialog.push_str("Continue?");
    ui.confirm_yn(&dialog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Evaluation, Student};
    use crate::prompt::MemoryPrompt;
    use serde_json::Value;

    fn server_sheet() -> GradeSheet {
        let mut sheet = GradeSheet::default();
        for (id, name) in [("1", "DUPONT Jean"), ("2", "MARTIN Luc"), ("3", "PETIT Zoé")] {
            sheet.students.push(Student { id: id.into(), name: name.into() });
        }
        sheet.evaluations.push(Evaluation {
            id: "d1".into(),
            title: "DS1".into(),
            max_grade: 20.0,
            coefficient: 1.0,
            date_ymd: None,
            raw: Value::Null,
        });
        sheet.grades.insert(("d1".into(), "1".into()), "12,5".into());
        sheet.grades.insert(("d1".into(), "2".into()), "8".into());
        sheet.grades.insert(("d1".into(), "3".into()), "".into());
        sheet
    }

    fn rows() -> Vec<Vec<String>> {
        vec![
            vec!["DUPONT Jean".into(), "12,5".into()],
            vec!["MARTIN Luc".into(), "".into()],
            vec!["PETIT Zoé".into(), "25".into()],
            vec!["INCONNU Paul".into(), "7".into()],
            vec!["14/20".into(), "".into()],
        ]
    }

    #[test]
    fn test_match_students() {
        let server = server_sheet();
        let rows = rows();
        let refs: Vec<&Vec<String>> = rows.iter().collect();
        let matched = match_students(&server, &refs);
        assert_eq!(matched.rows.len(), 3);
        assert_eq!(matched.unmatched_csv, vec!["INCONNU Paul".to_string()]);
        assert!(matched.unmatched_server.is_empty());
        assert!(matched.mismatched());
    }

    #[test]
    fn test_plan_classifies_and_clips() {
        let server = server_sheet();
        let rows = rows();
        let refs: Vec<&Vec<String>> = rows.iter().collect();
        let matched = match_students(&server, &refs);
        let evals = vec![PairedEval {
            title: "DS1".into(),
            col: 1,
            max_grade: 20.0,
            coefficient: 1.0,
            id: "d1".into(),
        }];
        let plan = plan_grades(&server, &matched, &evals, false);
        // DUPONT unchanged, MARTIN deleted, PETIT written (clipped).
        assert_eq!(plan.write_count(), 2);
        assert_eq!(plan.delete_count(), 1);
        assert_eq!(plan.overwrite_count(), 0);
        assert_eq!(plan.changes["d1"]["3"], "20");
        assert_eq!(plan.changes["d1"]["2"], "");
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_plan_never_delete_skips_deletions() {
        let server = server_sheet();
        let rows = rows();
        let refs: Vec<&Vec<String>> = rows.iter().collect();
        let matched = match_students(&server, &refs);
        let evals = vec![PairedEval {
            title: "DS1".into(),
            col: 1,
            max_grade: 20.0,
            coefficient: 1.0,
            id: "d1".into(),
        }];
        let plan = plan_grades(&server, &matched, &evals, true);
        assert_eq!(plan.write_count(), 1);
        assert_eq!(plan.delete_count(), 1);
        assert!(!plan.changes["d1"].contains_key("2"));
    }

    #[test]
    fn test_plan_appreciations() {
        let server = server_sheet();
        let rows = vec![
            vec!["DUPONT Jean".to_string(), "Bon travail".to_string()],
            vec!["MARTIN Luc".to_string(), "".to_string()],
            vec!["PETIT Zoé".to_string(), "Peut mieux faire".to_string()],
        ];
        let refs: Vec<&Vec<String>> = rows.iter().collect();
        let matched = match_students(&server, &refs);
        let mut web = HashMap::new();
        web.insert("1".to_string(), "Bon travail".to_string());
        web.insert("3".to_string(), "En progrès".to_string());
        let plan = plan_appreciations(&web, &matched, 1);
        // DUPONT unchanged, MARTIN empty cell skipped, PETIT overwrites.
        assert_eq!(plan.writes, vec!["3".to_string()]);
        assert_eq!(plan.overwrites, vec!["3".to_string()]);
        assert_eq!(plan.changes, vec![("3".to_string(), "Peut mieux faire".to_string())]);
    }

    #[test]
    fn test_students_preview_truncates() {
        let names: HashMap<StudentId, String> =
            (1..=6).map(|i| (i.to_string(), format!("Student {}", i))).collect();
        let ids: Vec<StudentId> = (1..=6).map(|i| i.to_string()).collect();
        let preview = students_preview(&names, &ids);
        assert!(preview.starts_with("For student(s): "));
        assert!(preview.ends_with("..."));
        assert_eq!(preview.matches(',').count(), 4);
    }

    #[test]
    fn test_confirm_upload_no_dialog_needed() {
        let ui = MemoryPrompt::new(&[]);
        assert!(confirm_upload(&ui, "grade", 3, 0, 0, false, false).unwrap());
        assert!(ui.asked().is_empty());
    }

    #[test]
    fn test_confirm_upload_mentions_deletes() {
        let ui = MemoryPrompt::new(&["n"]);
        let go = confirm_upload(&ui, "grade", 3, 1, 2, true, true).unwrap();
        assert!(!go);
        let asked = ui.asked();
        assert!(asked[0].contains("DELETE 2"));
        assert!(asked[0].contains("OVERWRITE 1"));
        assert!(asked[0].contains("write 3 grade(s)"));
    }
}
