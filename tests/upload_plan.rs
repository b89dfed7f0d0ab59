use serde_json::Value;

use lvsync::backend::{Evaluation, GradeSheet, Student};
use lvsync::{reconcile, sheet};

// The whole csv-to-upload pipeline on an export as the website writes
// it: parse, match students, diff against server state.
#[test]
fn export_to_upload_plan() {
    let export = "\u{feff}\"MATHTC 1G79\";\"DS1\";\"DM1\"\n\
\"3 élèves\";\"/20 - Coef : 1\";\"/10 - Coef : 0,5\"\n\
\"DUPONT Jean\";\"12,5\";\"8\"\n\
\"MARTIN Luc\";\"15\";\"\"\n\
\"PETIT Zoé\";\"ABS\";\"9,5\"\n\
\"Moyenne\";\"13,75\";\"8,75\"\n";
    let rows = sheet::rows_from_str(export).unwrap();
    assert_eq!(sheet::group_name(&rows).unwrap(), "MATHTC 1G79");
    let csv_evals = sheet::evaluations(&rows).unwrap();
    assert_eq!(csv_evals.len(), 2);

    let mut server = GradeSheet::default();
    for (id, name) in [("1", "DUPONT Jean"), ("2", "MARTIN Luc"), ("3", "PETIT Zoé")] {
        server.students.push(Student { id: id.into(), name: name.into() });
    }
    for (id, title, max) in [("d1", "DS1", 20.0), ("d2", "DM1", 10.0)] {
        server.evaluations.push(Evaluation {
            id: id.into(),
            title: title.into(),
            max_grade: max,
            coefficient: 1.0,
            date_ymd: None,
            raw: Value::Null,
        });
    }
    // DS1 on the server: DUPONT already graded the same, MARTIN graded
    // differently, PETIT empty. DM1: MARTIN has a grade the csv lost.
    server.grades.insert(("d1".into(), "1".into()), "12,5".into());
    server.grades.insert(("d1".into(), "2".into()), "14".into());
    server.grades.insert(("d1".into(), "3".into()), "".into());
    server.grades.insert(("d2".into(), "1".into()), "8".into());
    server.grades.insert(("d2".into(), "2".into()), "9".into());
    server.grades.insert(("d2".into(), "3".into()), "9,5".into());

    let matched = reconcile::match_students(&server, &sheet::student_rows(&rows));
    assert_eq!(matched.rows.len(), 3);
    assert!(!matched.mismatched());

    let paired: Vec<reconcile::PairedEval> = csv_evals
        .iter()
        .zip(["d1", "d2"])
        .map(|(e, id)| reconcile::PairedEval {
            title: e.title.clone(),
            col: e.col,
            max_grade: e.max_grade,
            coefficient: e.coefficient,
            id: id.to_string(),
        })
        .collect();

    let plan = reconcile::plan_grades(&server, &matched, &paired, false);
    // DS1: MARTIN overwritten (14 -> 15), PETIT written ("ABS" over
    // empty). DM1: MARTIN's grade deleted.
    assert_eq!(plan.write_count(), 3);
    assert_eq!(plan.overwrite_count(), 1);
    assert_eq!(plan.delete_count(), 1);
    assert_eq!(plan.changes["d1"]["2"], "15");
    assert_eq!(plan.changes["d1"]["3"], "ABS");
    assert_eq!(plan.changes["d2"]["2"], "");
    assert!(!plan.changes["d1"].contains_key("1"));

    // The same plan with deletions disabled keeps DM1 untouched.
    let plan = reconcile::plan_grades(&server, &matched, &paired, true);
    assert_eq!(plan.write_count(), 2);
    assert!(!plan.changes.contains_key("d2"));
}
