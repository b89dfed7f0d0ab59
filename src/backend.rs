use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde_json::Value;

use crate::rooms::Slot;

pub type StudentId = String;
pub type EvalId = String;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// What identifies a teacher's group on the server. Axess keys grades
/// on a per-teacher service id; Pronote wants the whole group record
/// echoed back in later calls.
#[derive(Debug, Clone)]
pub enum GroupHandle {
    Axess { service_id: i64 },
    Pronote { data: Value },
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub handle: GroupHandle,
}

impl Group {
    pub fn axess_service_id(&self) -> Result<i64> {
        match &self.handle {
            GroupHandle::Axess { service_id } => Ok(*service_id),
            GroupHandle::Pronote { .. } => bail!("group {} was not resolved by the axess backend", self.name),
        }
    }

    pub fn pronote_data(&self) -> Result<&Value> {
        match &self.handle {
            GroupHandle::Pronote { data } => Ok(data),
            GroupHandle::Axess { .. } => bail!("group {} was not resolved by the pronote backend", self.name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub id: EvalId,
    pub title: String,
    pub max_grade: f64,
    pub coefficient: f64,
    pub date_ymd: Option<String>,
    /// Backend record as received; editing an evaluation echoes most of
    /// its original fields back.
    pub raw: Value,
}

/// One grade sheet for (group, trimester), normalized to the same shape
/// whichever backend produced it.
#[derive(Debug, Default)]
pub struct GradeSheet {
    pub students: Vec<Student>,
    pub evaluations: Vec<Evaluation>,
    pub grades: HashMap<(EvalId, StudentId), String>,
}

impl GradeSheet {
    pub fn student_names(&self) -> HashMap<StudentId, String> {
        self.students.iter().map(|s| (s.id.clone(), s.name.clone())).collect()
    }

    pub fn evaluation_titled(&self, title: &str) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.title == title)
    }

    pub fn grade_of(&self, eval_id: &str, student_id: &str) -> Option<&str> {
        self.grades
            .get(&(eval_id.to_string(), student_id.to_string()))
            .map(|s| s.as_str())
    }
}

/// Grade changes to push: evaluation id -> student id -> new grade.
pub type GradeChanges = BTreeMap<EvalId, BTreeMap<StudentId, String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    Staff,
    Teacher,
    Student,
    Parent,
}

impl FromStr for RecipientKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "staff" => Ok(Self::Staff),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            "parent" => Ok(Self::Parent),
            _ => bail!("incorrect recipient type {} (should be staff, teacher, student or parent)", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    pub id: String,
}

/// One absence-calendar line: a date and the motives recorded on it.
#[derive(Debug, Clone)]
pub struct CalendarEntry {
    pub date_dmy: String,
    pub motives: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InboxMail {
    pub sender: String,
    pub received: String,
    pub subject: String,
    pub body_html: String,
}

pub fn unsupported<T>(backend: &str, what: &str) -> Result<T> {
    bail!("{} is not supported by the {} backend", what, backend)
}

/// The operations the tools run against a portal. Everything a backend
/// cannot do reports a uniform "not supported" error through the
/// defaults below.
pub trait Backend {
    fn label(&self) -> &'static str;

    /// Trimester label as it appears in export file names.
    fn trimester_label_pattern(&self) -> &'static str;

    fn close(&mut self) {}

    fn groups(&mut self) -> Result<Vec<Group>>;

    /// Resolves a group name (as found in a csv export) to the server's
    /// group record.
    fn resolve_group(&mut self, name: &str) -> Result<Group>;

    fn default_trimester(&mut self) -> Result<u8>;

    fn grade_sheet(&mut self, group: &Group, trimester: u8) -> Result<GradeSheet>;

    fn upload_grades(
        &mut self,
        group: &Group,
        trimester: u8,
        sheet: &GradeSheet,
        changes: &GradeChanges,
    ) -> Result<()>;

    fn appreciations(&mut self, _group: &Group, _trimester: u8) -> Result<HashMap<StudentId, String>> {
        unsupported(self.label(), "reading appreciations")
    }

    fn upload_appreciations(
        &mut self,
        _group: &Group,
        _trimester: u8,
        _changes: &[(StudentId, String)],
    ) -> Result<()> {
        unsupported(self.label(), "writing appreciations")
    }

    fn create_evaluation(
        &mut self,
        _group: &Group,
        _trimester: u8,
        _title: &str,
        _max_grade: f64,
        _coefficient: f64,
        _hidden: bool,
    ) -> Result<EvalId> {
        unsupported(self.label(), "creating evaluations")
    }

    fn update_evaluation(
        &mut self,
        _group: &Group,
        _trimester: u8,
        _eval: &Evaluation,
        _max_grade: f64,
        _coefficient: f64,
    ) -> Result<()> {
        unsupported(self.label(), "editing evaluations")
    }

    fn send_message(
        &mut self,
        query: &str,
        kind: RecipientKind,
        subject: &str,
        body: &str,
    ) -> Result<()>;

    fn rooms(&mut self) -> Result<Vec<Room>> {
        unsupported(self.label(), "room schedules")
    }

    fn room_week(&mut self, _room: &Room) -> Result<Vec<(u32, Slot)>> {
        unsupported(self.label(), "room schedules")
    }

    /// Moves the schedule pages to the week containing the given date.
    fn select_week(&mut self, _date_dmy: &str) -> Result<()> {
        unsupported(self.label(), "room schedules")
    }

    fn attendance_classgroups(&mut self) -> Result<Vec<(String, String)>> {
        unsupported(self.label(), "attendance calendars")
    }

    fn classgroup_students(&mut self, _classgroup_id: &str) -> Result<Vec<(String, String)>> {
        unsupported(self.label(), "attendance calendars")
    }

    fn student_calendar(
        &mut self,
        _classgroup_id: &str,
        _student_id: &str,
    ) -> Result<Vec<CalendarEntry>> {
        unsupported(self.label(), "attendance calendars")
    }

    fn inbox(&mut self) -> Result<Vec<InboxMail>> {
        unsupported(self.label(), "the inbox")
    }
}

const PRONOTE_URL: &str = r"^https://[^/]+\.[^/]+/pronote/";

/// Opens a session on whichever backend the login url points to.
pub fn connect(login_url: &str, creds: &Credentials) -> Result<Box<dyn Backend>> {
    let url = login_url.trim().trim_end_matches('/');
    if !url.starts_with("https://") {
        bail!("incorrect url provided, aborting");
    }
    if Regex::new(PRONOTE_URL).unwrap().is_match(url) {
        let session = crate::pronote::PronoteSession::open(url, creds)?;
        return Ok(Box::new(session));
    }
    let base = Regex::new(r"^(https://[^/]+)").unwrap()
        .captures(url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| anyhow!("incorrect url provided, aborting"))?;
    let session = crate::axess::AxessSession::open(&base, creds)?;
    Ok(Box::new(session))
}

/// True when the url selects the pronote backend.
pub fn is_pronote_url(login_url: &str) -> bool {
    Regex::new(PRONOTE_URL).unwrap().is_match(login_url.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopBackend;

    impl Backend for NoopBackend {
        fn label(&self) -> &'static str {
            "noop"
        }
        fn trimester_label_pattern(&self) -> &'static str {
            r"Trimestre (?:1|2|3)"
        }
        fn groups(&mut self) -> Result<Vec<Group>> {
            Ok(vec![])
        }
        fn resolve_group(&mut self, name: &str) -> Result<Group> {
            bail!("unknown group {}", name)
        }
        fn default_trimester(&mut self) -> Result<u8> {
            Ok(1)
        }
        fn grade_sheet(&mut self, _group: &Group, _trimester: u8) -> Result<GradeSheet> {
            Ok(GradeSheet::default())
        }
        fn upload_grades(
            &mut self,
            _group: &Group,
            _trimester: u8,
            _sheet: &GradeSheet,
            _changes: &GradeChanges,
        ) -> Result<()> {
            Ok(())
        }
        fn send_message(
            &mut self,
            _query: &str,
            _kind: RecipientKind,
            _subject: &str,
            _body: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_defaults_report_unsupported() {
        let mut b = NoopBackend;
        let err = b.rooms().unwrap_err().to_string();
        assert!(err.contains("not supported by the noop backend"));
        let err = b
            .create_evaluation(
                &Group { name: "G".into(), handle: GroupHandle::Axess { service_id: 1 } },
                1,
                "DS1",
                20.0,
                1.0,
                false,
            )
            .unwrap_err()
            .to_string();
        assert!(err.contains("creating evaluations"));
    }

    #[test]
    fn test_group_handle_accessors() {
        let g = Group { name: "G".into(), handle: GroupHandle::Axess { service_id: 42 } };
        assert_eq!(g.axess_service_id().unwrap(), 42);
        assert!(g.pronote_data().is_err());
    }

    #[test]
    fn test_recipient_kind_parse() {
        assert_eq!("student".parse::<RecipientKind>().unwrap(), RecipientKind::Student);
        assert!("pupil".parse::<RecipientKind>().is_err());
    }

    #[test]
    fn test_url_dispatch_shape() {
        assert!(is_pronote_url("https://0123456a.index-education.net/pronote/professeur.html"));
        assert!(!is_pronote_url("https://exemple.la-vie-scolaire.fr/login"));
    }

    #[test]
    fn test_connect_rejects_plain_http() {
        let creds = Credentials { user: "u".into(), password: "p".into() };
        assert!(connect("http://exemple.la-vie-scolaire.fr/login", &creds).is_err());
    }

    #[test]
    fn test_grade_sheet_lookups() {
        let mut sheet = GradeSheet::default();
        sheet.students.push(Student { id: "7".into(), name: "DUPONT Jean".into() });
        sheet.evaluations.push(Evaluation {
            id: "3".into(),
            title: "DS1".into(),
            max_grade: 20.0,
            coefficient: 1.0,
            date_ymd: None,
            raw: Value::Null,
        });
        sheet.grades.insert(("3".into(), "7".into()), "12,5".into());
        assert_eq!(sheet.grade_of("3", "7"), Some("12,5"));
        assert!(sheet.evaluation_titled("DS1").is_some());
        assert_eq!(sheet.student_names().get("7").map(String::as_str), Some("DUPONT Jean"));
    }
}
