use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::SET_COOKIE;
use scraper::{Html, Selector};
use serde_json::{json, Value};

use crate::backend::{
    Backend, CalendarEntry, Credentials, EvalId, Evaluation, GradeChanges, GradeSheet, Group,
    GroupHandle, InboxMail, Room, RecipientKind, Student, StudentId,
};
use crate::http;
use crate::messages;
use crate::rooms::{Slot, TimeOfDay};

// Website endpoint names kept as on the site; easier to compare with a
// network trace.
const CONNEXION: &str = "/vsn.main/WSAuth/connexion";
const GET_GROUPS: &str = "/vsn.main/WSCompetences/loadServicesProf";
const GET_GRADES: &str = "/vsn.main/WSCompetences/loadDevoirsNotesMoyennes";
const SEND_GRADES: &str = "/vsn.main/WSCompetences/saveBatchEvaluations";
const CREATE_EVALUATION: &str = "/vsn.main/WSCompetences/creerEvaluation";
const MODIFY_EVALUATION: &str = "/vsn.main/WSCompetences/modifierDevoir";
const GET_APPRS: &str = "/vsn.main/WSCompetences/loadInfosFinPeriode";
const SEND_APPR: &str = "/vsn.main/WSCompetences/saveAppreciation";
const NEW_MESSAGE: &str = "/vsn.main/WSmessagerie/mails/new";
const DEST: &str = "/vsn.main/WSmessagerie/destinataires";
const INBOX: &str = "/vsn.main/WSmessagerie/avecpages/2/0";
const ROOM: &str = "/vsn.main/temps/salle";
const SELECT_DATE: &str = "/vsn.main/temps/semaineDate";
const MODULE_URL: &str = "/vsn.main/WSMenu/getModuleUrl?mod=ABSENCES&minuteEcartGMTClient=-120";
const ABSENCE_START: &str =
    "/vsn.main/absence/absenceStart?actionEnd=calendrierAbsenceEleve&type=absence&idEleve=&accesDeMenu=true";
const ATTENDANCE_INDEX: &str = "/vsn.main/absence/choixClasseEleveStrater";
const ATTENDANCE_CLASS: &str = "/vsn.main/absence/choixClasseEleve";
const ATTENDANCE_CALENDAR: &str = "/vsn.main/absence/calendrierAbsenceEleve";

pub struct AxessSession {
    client: Client,
    base_url: String,
    teacher_id: i64,
    // The attendance pages 500 without their warm-up sequence; run it
    // once per session.
    attendance_ready: bool,
    groups_json: Option<Value>,
}

fn pad_base64(s: &str) -> String {
    let pad = (4 - s.len() % 4) % 4;
    format!("{}{}", s, "=".repeat(pad))
}

/// The teacher id only travels in the `pid` claim of the session
/// cookie.
pub fn teacher_id_from_jwt(cookie_value: &str) -> Result<i64> {
    let payload64 = cookie_value.split('.').nth(1)
        .ok_or_else(|| anyhow!("session error: no payload in JWT cookie"))?;
    let stripped = payload64.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(stripped)
        .or_else(|_| STANDARD.decode(pad_base64(stripped)))
        .map_err(|_| anyhow!("session error: unreadable JWT cookie"))?;
    let payload: Value = serde_json::from_slice(&bytes)
        .map_err(|_| anyhow!("session error: unreadable JWT cookie"))?;
    payload.get("pid").and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("session error: no pid in JWT cookie"))
}

/// Numbers and strings both appear as ids in the site's json.
fn id_string(v: &Value) -> String {
    match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn id_value(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(id),
    }
}

fn grade_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn select_options(html: &Html, css: &str) -> Vec<(String, String)> {
    let selector = Selector::parse(css).unwrap();
    let mut options = vec![];
    for option in html.select(&selector) {
        let value = option.value().attr("value").unwrap_or("null");
        if value == "null" {
            continue;
        }
        let name = option.text().collect::<String>().trim().to_string();
        options.push((name, value.to_string()));
    }
    options
}

pub fn parse_room_options(html: &str) -> Result<Vec<Room>> {
    let doc = Html::parse_document(html);
    let options = select_options(&doc, "select#idSalle option");
    if options.is_empty() {
        bail!("unexpected format for classroom selection menu");
    }
    Ok(options.into_iter().map(|(name, id)| Room { name, id }).collect())
}

pub fn parse_room_week(html: &str) -> Vec<(u32, Slot)> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("div#infosCoursEleve").unwrap();
    let date_re = Regex::new(r"Cours du \w+ (\d{2})").unwrap();
    let range_re = Regex::new(r"de (\d\d)h(\d\d) à (\d\d)h(\d\d)").unwrap();
    let mut schedule = vec![];
    for block in doc.select(&selector) {
        let text = block.text().collect::<String>();
        let day: u32 = match date_re.captures(&text) {
            Some(caps) => caps[1].parse().expect("two-digit day"),
            None => continue,
        };
        let caps = match range_re.captures(&text) {
            Some(c) => c,
            None => continue,
        };
        let start = TimeOfDay::new(caps[1].parse().unwrap_or(0), caps[2].parse().unwrap_or(0));
        let end = TimeOfDay::new(caps[3].parse().unwrap_or(0), caps[4].parse().unwrap_or(0));
        schedule.push((day, Slot::new(start, end)));
    }
    schedule
}

pub fn parse_classgroup_options(html: &str) -> Result<Vec<(String, String)>> {
    let doc = Html::parse_document(html);
    let form = Selector::parse("#chooseMenuForm").unwrap();
    if doc.select(&form).next().is_none() {
        bail!("unexpected format for attendance index on website");
    }
    Ok(select_options(&doc, "#chooseMenuForm option"))
}

pub fn parse_student_options(html: &str) -> Result<Vec<(String, String)>> {
    let doc = Html::parse_document(html);
    let select = Selector::parse("select#idEleve").unwrap();
    if doc.select(&select).count() != 1 {
        bail!("unexpected format for attendance initial display on website");
    }
    Ok(select_options(&doc, "select#idEleve option"))
}

/// One cell per absence: a DD/MM/YYYY date followed by motive lines
/// like `De 10h10 à 11h00 - Maladie sans certif/rdv med`.
pub fn parse_student_calendar(html: &str) -> Result<Vec<CalendarEntry>> {
    let doc = Html::parse_document(html);
    let table = Selector::parse("table.tabCalendrierEleve").unwrap();
    if doc.select(&table).count() != 1 {
        bail!("unexpected format of student calendar view (no table tag found)");
    }
    let cell = Selector::parse("table.tabCalendrierEleve span.corp").unwrap();
    let date_re = Regex::new(r"\d\d/\d\d/\d\d\d\d").unwrap();
    let motive_re = Regex::new(r"\S.*\S").unwrap();
    let mut entries = vec![];
    for span in doc.select(&cell) {
        let text = span.text().collect::<Vec<_>>().join("\n");
        let found = date_re.find(&text).ok_or_else(|| {
            anyhow!("unexpected format of student calendar view (couldn't find date in cell)")
        })?;
        let date = found.as_str().to_string();
        let rest = &text[found.end()..];
        let motives = motive_re.find_iter(rest).map(|m| m.as_str().to_string()).collect();
        entries.push(CalendarEntry { date_dmy: date, motives });
    }
    Ok(entries)
}

fn sheet_from_json(grades_json: &Value) -> GradeSheet {
    let mut sheet = GradeSheet::default();
    if let Some(students) = grades_json.get("eleves").and_then(Value::as_array) {
        for student in students {
            let id = id_string(&student["eleveid"]);
            let name = format!(
                "{} {}",
                student["nom"].as_str().unwrap_or(""),
                student["prenom"].as_str().unwrap_or("")
            )
            .trim()
            .to_string();
            sheet.students.push(Student { id: id.clone(), name });
            if let Some(notes) = student.get("notes").and_then(Value::as_array) {
                for note in notes {
                    let eval_id = id_string(&note["iddevoir"]);
                    sheet.grades.insert((eval_id, id.clone()), grade_string(&note["note"]));
                }
            }
        }
    }
    if let Some(evaluations) = grades_json.get("evaluations").and_then(Value::as_array) {
        for devoir in evaluations {
            sheet.evaluations.push(Evaluation {
                id: id_string(&devoir["id"]),
                title: devoir["titre"].as_str().unwrap_or("").to_string(),
                max_grade: devoir["noteMaximalEvaluation"].as_f64().unwrap_or(20.0),
                coefficient: devoir["coefficient"].as_f64().unwrap_or(1.0),
                date_ymd: devoir["dateDevoir"].as_str().map(|s| s.to_string()),
                raw: devoir.clone(),
            });
        }
    }
    sheet
}

impl AxessSession {
    pub fn open(base_url: &str, creds: &Credentials) -> Result<Self> {
        let client = http::session_client()?;
        let payload = json!({
            "externalentpersjointure": null,
            "login": creds.user,
            "password": creds.password,
        });
        let url = format!("{}{}", base_url, CONNEXION);
        let response = client.post(&url).json(&payload).send()
            .map_err(|e| anyhow!("connexion error:\n{}", e))?;
        if !response.status().is_success() {
            bail!("error code on login request: {}", response.status());
        }
        let jwt = response.headers().get_all(SET_COOKIE).iter()
            .filter_map(|h| h.to_str().ok())
            .find_map(|cookie| {
                cookie.strip_prefix("JWT-LVS=").map(|rest| {
                    rest.split(';').next().unwrap_or("").to_string()
                })
            })
            .ok_or_else(|| anyhow!("session error: no JWT in cookies"))?;
        let body: Value = response.json()
            .map_err(|_| anyhow!("unexpected authentification request response"))?;
        match body.get("auth").and_then(Value::as_str) {
            None => bail!("unexpected authentification request response"),
            Some("ok") => {}
            Some(_) => bail!("authentification failure"),
        }
        println!("Authentification success");
        let teacher_id = teacher_id_from_jwt(&jwt)?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            teacher_id,
            attendance_ready: false,
            groups_json: None,
        })
    }

    fn url(&self, rel: &str) -> String {
        format!("{}{}", self.base_url, rel)
    }

    fn groups_json(&mut self) -> Result<Value> {
        if let Some(cached) = &self.groups_json {
            return Ok(cached.clone());
        }
        let payload = json!({ "idprof": self.teacher_id });
        let groups = http::post_json(&self.client, &self.url(GET_GROUPS), &payload)?;
        self.groups_json = Some(groups.clone());
        Ok(groups)
    }

    fn prepare_attendance(&mut self) -> Result<()> {
        if self.attendance_ready {
            return Ok(());
        }
        // These requests redirect through an externalOpen page with an
        // encrypted autolog parameter. Without them the calendar
        // request fails with 500.
        let module = http::post_empty_json(&self.client, &self.url(MODULE_URL))?;
        let location = module.get("location").and_then(Value::as_str)
            .ok_or_else(|| anyhow!("unexpected format for attendance module redirect"))?;
        http::get_text(&self.client, location)?;
        http::get_text(&self.client, &self.url(ABSENCE_START))?;
        self.attendance_ready = true;
        Ok(())
    }
}

impl Backend for AxessSession {
    fn label(&self) -> &'static str {
        "axess"
    }

    fn trimester_label_pattern(&self) -> &'static str {
        r"(?:1er|2ème|3ème) Trimestre"
    }

    fn groups(&mut self) -> Result<Vec<Group>> {
        let groups_json = self.groups_json()?;
        let list = groups_json.as_array()
            .ok_or_else(|| anyhow!("unexpected format for the group list"))?;
        let mut groups = vec![];
        for group in list {
            let name = group["libelle"].as_str().unwrap_or("").to_string();
            let service_id = group["id"].as_i64()
                .ok_or_else(|| anyhow!("unexpected format for the group list"))?;
            groups.push(Group { name, handle: GroupHandle::Axess { service_id } });
        }
        Ok(groups)
    }

    /// The csv group name is usually longer than the site's label
    /// ("MATHTC 1G79" vs "1G79"), so the match is by substring.
    fn resolve_group(&mut self, name: &str) -> Result<Group> {
        let groups = self.groups()?;
        for group in &groups {
            if group.name.contains(name.trim()) || name.contains(&group.name) {
                return Ok(group.clone());
            }
        }
        let known = groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>().join(", ");
        bail!(
            "unable to match group name \"{}\" to one of the class group names on the website (full list: {})",
            name, known
        )
    }

    fn default_trimester(&mut self) -> Result<u8> {
        let groups_json = self.groups_json()?;
        let first = groups_json.as_array().and_then(|l| l.first())
            .ok_or_else(|| anyhow!("no groups found on website"))?;
        let periods = first.get("periodes").and_then(Value::as_array)
            .ok_or_else(|| anyhow!("unexpected format on website, unable to get trimesters information"))?;
        let mut default_t = 0u8;
        let mut all_locked = true;
        for period in periods {
            let t = period["numero"].as_u64().unwrap_or(0) as u8;
            if period["isParDefaut"].as_bool() == Some(true) {
                default_t = t;
            }
            let locks = period.get("verrouillages").and_then(Value::as_array);
            if let Some(first_lock) = locks.and_then(|l| l.first()) {
                if first_lock["verrouille"].as_bool() == Some(false) {
                    all_locked = false;
                }
            }
        }
        if default_t == 0 {
            bail!("unexpected format on website, unable to get trimesters information");
        }
        if all_locked {
            // All trimesters locked means the year has ended.
            return Ok(3);
        }
        Ok(default_t)
    }

    fn grade_sheet(&mut self, group: &Group, trimester: u8) -> Result<GradeSheet> {
        let payload = json!({
            "serviceId": group.axess_service_id()?,
            "periodeId": trimester,
            "devoirId": null,
            "profId": self.teacher_id,
        });
        let grades_json = http::post_json(&self.client, &self.url(GET_GRADES), &payload)?;
        Ok(sheet_from_json(&grades_json))
    }

    fn upload_grades(
        &mut self,
        group: &Group,
        trimester: u8,
        _sheet: &GradeSheet,
        changes: &GradeChanges,
    ) -> Result<()> {
        let mut saisies = vec![];
        for (eval_id, per_student) in changes {
            for (student_id, grade) in per_student {
                saisies.push(json!({
                    "ideleve": id_value(student_id),
                    "competences": [],
                    "noteToSave": true,
                    "competencesToSave": false,
                    "iddevoir": id_value(eval_id),
                    "note": grade,
                }));
            }
        }
        let payload = json!({
            "saisies": saisies,
            "devoirs": changes.keys().map(|id| id_value(id)).collect::<Vec<_>>(),
            "bonus": [],
            "idservice": group.axess_service_id()?,
            "idperiode": trimester,
        });
        http::post_json(&self.client, &self.url(SEND_GRADES), &payload)?;
        Ok(())
    }

    fn appreciations(&mut self, group: &Group, trimester: u8) -> Result<HashMap<StudentId, String>> {
        let payload = json!({
            "idService": group.axess_service_id()?,
            "idPeriode": trimester,
        });
        let apprs_json = http::post_json(&self.client, &self.url(GET_APPRS), &payload)?;
        let mut apprs = HashMap::new();
        if let Some(students) = apprs_json.get("eleves").and_then(Value::as_array) {
            for student in students {
                let text = student
                    .get("appreciation")
                    .and_then(|a| a.get("appreciation"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if text.is_empty() {
                    continue;
                }
                apprs.insert(id_string(&student["id"]), text);
            }
        }
        Ok(apprs)
    }

    fn upload_appreciations(
        &mut self,
        group: &Group,
        trimester: u8,
        changes: &[(StudentId, String)],
    ) -> Result<()> {
        let service_id = group.axess_service_id()?;
        for (student_id, appreciation) in changes {
            log::debug!("uploading appreciation for student {}", student_id);
            let payload = json!({
                "periodeId": trimester,
                "serviceId": service_id,
                "eleveId": id_value(student_id),
                "appreciation": appreciation,
                "numero": 1,
            });
            http::post_json(&self.client, &self.url(SEND_APPR), &payload)?;
        }
        Ok(())
    }

    fn create_evaluation(
        &mut self,
        group: &Group,
        trimester: u8,
        title: &str,
        max_grade: f64,
        coefficient: f64,
        hidden: bool,
    ) -> Result<EvalId> {
        let payload = json!({
            "evaluation": {
                "dateDevoir": chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                "competenceIds": [],
                "titre": title,
                "publie": !hidden,
                "coefficient": crate::sheet::number_json(coefficient),
                "enseignantId": self.teacher_id,
                "noteMaximalEvaluation": crate::sheet::number_json(max_grade),
                "typeEvaluation": "NOTE",
                "serviceId": group.axess_service_id()?,
                "periodeId": trimester,
            }
        });
        println!("Creating {}", title);
        let created = http::post_json(&self.client, &self.url(CREATE_EVALUATION), &payload)?;
        let id = id_string(&created["id"]);
        if id.is_empty() {
            bail!("unexpected response when creating evaluation {}", title);
        }
        Ok(id)
    }

    fn update_evaluation(
        &mut self,
        group: &Group,
        trimester: u8,
        eval: &Evaluation,
        max_grade: f64,
        coefficient: f64,
    ) -> Result<()> {
        // The record we got is the basis of the payload; trim it to the
        // keys the endpoint accepts, then override what changes.
        let payload_keys = [
            "id", "verrouille", "sousServiceId", "publie", "enseignantId",
            "noteMaximalEvaluation", "periodeId", "titre", "typeEvaluation",
            "competenceIds", "serviceId", "coefficient", "dateDevoir", "typeDevoir",
        ];
        let source = eval.raw.as_object()
            .ok_or_else(|| anyhow!("no website record for evaluation {}", eval.title))?;
        let mut edited = serde_json::Map::new();
        for key in payload_keys {
            if let Some(v) = source.get(key) {
                edited.insert(key.to_string(), v.clone());
            }
        }
        edited.insert("competenceIds".into(), json!([]));
        edited.insert("periodeId".into(), json!(trimester));
        edited.insert("serviceId".into(), json!(group.axess_service_id()?));
        edited.insert("noteMaximalEvaluation".into(), crate::sheet::number_json(max_grade));
        edited.insert("coefficient".into(), crate::sheet::number_json(coefficient));
        println!("Modifying max grade or coefficient for {}", eval.title);
        let payload = json!({ "evaluation": edited });
        http::post_json(&self.client, &self.url(MODIFY_EVALUATION), &payload)?;
        Ok(())
    }

    fn send_message(
        &mut self,
        query: &str,
        kind: RecipientKind,
        subject: &str,
        body: &str,
    ) -> Result<()> {
        let draft = http::post_empty_json(&self.client, &self.url(NEW_MESSAGE))?;
        let draft_id = id_string(&draft["id"]);
        if draft_id.is_empty() {
            bail!("unexpected response when opening a new message");
        }
        let profile = match kind {
            RecipientKind::Staff => 0,
            RecipientKind::Teacher => 1,
            RecipientKind::Student => 2,
            RecipientKind::Parent => 3,
        };
        let search = json!({
            "niveaux": [],
            "profils": [profile],
            "groupes": [],
            "maxrows": 50,
            "typeRecherche": 1,
            "page": 1,
            "keyword": query,
        });
        let found = http::post_json(&self.client, &self.url(DEST), &search)?;
        let found = found.as_array().cloned().unwrap_or_default();
        if found.is_empty() {
            bail!("no result for recipient search \"{}\"", query);
        }
        if found.len() > 1 {
            bail!("multiple results for recipient search \"{}\"", query);
        }
        let recipient = &found[0];
        let add_url = format!("{}/vsn.main/WSmessagerie/mails/{}/destinataires/a", self.base_url, draft_id);
        let added = http::post_json(&self.client, &add_url, recipient)?;
        let mut compose = draft;
        compose["a"] = added;
        compose["objet"] = json!(subject);
        compose["message"] = json!(messages::portal_html(body));
        let compose_url = format!("{}/vsn.main/WSmessagerie/mails/{}", self.base_url, draft_id);
        http::post_json(&self.client, &compose_url, &compose)?;
        let send_url = format!("{}/vsn.main/WSmessagerie/mails/{}/envoyer", self.base_url, draft_id);
        let sent = http::post_empty_json(&self.client, &send_url)?;
        let count = match &sent["nbenvoi"] {
            Value::Number(n) => n.as_i64().unwrap_or(0),
            Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        };
        if count != 1 {
            bail!("message not sent successfully (nb of messages sent: {})", count);
        }
        Ok(())
    }

    fn rooms(&mut self) -> Result<Vec<Room>> {
        let html = http::get_text(&self.client, &self.url(ROOM))?;
        parse_room_options(&html)
    }

    fn room_week(&mut self, room: &Room) -> Result<Vec<(u32, Slot)>> {
        let html = http::post_query_text(&self.client, &self.url(ROOM), &[("idSalle", &room.id)])?;
        Ok(parse_room_week(&html))
    }

    fn select_week(&mut self, date_dmy: &str) -> Result<()> {
        http::post_query_text(&self.client, &self.url(SELECT_DATE), &[("dateSemaine", date_dmy)])?;
        Ok(())
    }

    fn attendance_classgroups(&mut self) -> Result<Vec<(String, String)>> {
        self.prepare_attendance()?;
        let html = http::get_text(&self.client, &self.url(ATTENDANCE_INDEX))?;
        parse_classgroup_options(&html)
    }

    fn classgroup_students(&mut self, classgroup_id: &str) -> Result<Vec<(String, String)>> {
        self.prepare_attendance()?;
        let html = http::post_form_text(
            &self.client,
            &self.url(ATTENDANCE_CLASS),
            &[
                ("idClasse", classgroup_id),
                ("clean_resteList", "true"),
                ("actionEnd", "calendrierAbsenceEleve"),
                ("controllerEnd", ""),
            ],
        )?;
        parse_student_options(&html)
    }

    fn student_calendar(&mut self, classgroup_id: &str, student_id: &str) -> Result<Vec<CalendarEntry>> {
        self.prepare_attendance()?;
        // This request 302s into a GET carrying a jwtClaim parameter;
        // the client follows it.
        let html = http::post_form_text(
            &self.client,
            &self.url(ATTENDANCE_CALENDAR),
            &[
                ("idClasse", classgroup_id),
                ("idEleve", student_id),
                ("clean_resteList", ""),
                ("actionEnd", "calendrierAbsenceEleve"),
                ("controllerEnd", ""),
            ],
        )?;
        parse_student_calendar(&html)
    }

    fn inbox(&mut self) -> Result<Vec<InboxMail>> {
        let inbox_json = http::get_json(&self.client, &self.url(INBOX))?;
        let mails = inbox_json.get("mails").and_then(Value::as_array)
            .context("unexpected format for the inbox")?;
        Ok(mails.iter().map(|mail| InboxMail {
            sender: mail["expediteur"].as_str().unwrap_or("").to_string(),
            received: mail["dateCreationStr"].as_str().unwrap_or("").to_string(),
            subject: mail["objet"].as_str().unwrap_or("").to_string(),
            body_html: mail["message"].as_str().unwrap_or("").to_string(),
        }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teacher_id_from_jwt() {
        // header.payload.signature with payload {"pid":4217}
        let payload = URL_SAFE_NO_PAD.encode(br#"{"pid":4217,"exp":0}"#);
        let cookie = format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload);
        assert_eq!(teacher_id_from_jwt(&cookie).unwrap(), 4217);
        assert!(teacher_id_from_jwt("not-a-jwt").is_err());
    }

    #[test]
    fn test_parse_room_options_skips_null() {
        let html = r#"<select id="idSalle">
            <option value="null">Choisir...</option>
            <option value="12">A101</option>
            <option value="15">B201</option>
        </select>"#;
        let rooms = parse_room_options(html).unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].name, "A101");
        assert_eq!(rooms[0].id, "12");
    }

    #[test]
    fn test_parse_room_week() {
        let html = r#"
          <div id="infosCoursEleve">Cours du jeudi 12 de 08h00 à 09h00 MATHS</div>
          <div id="infosCoursEleve">Cours du vendredi 13 de 10h30 à 12h00 SVT</div>
          <div id="infosCoursEleve">pas un cours</div>"#;
        let week = parse_room_week(html);
        assert_eq!(week.len(), 2);
        assert_eq!(week[0], (12, Slot::new(TimeOfDay::new(8, 0), TimeOfDay::new(9, 0))));
        assert_eq!(week[1].0, 13);
    }

    #[test]
    fn test_parse_classgroup_and_student_options() {
        let html = r#"<form id="chooseMenuForm">
            <select><option value="null">-</option><option value="3">1G79</option></select>
        </form>"#;
        let groups = parse_classgroup_options(html).unwrap();
        assert_eq!(groups, vec![("1G79".to_string(), "3".to_string())]);
        assert!(parse_classgroup_options("<p>nothing</p>").is_err());

        let html = r#"<select id="idEleve">
            <option value="null">-</option>
            <option value="77">DUPONT Jean</option>
        </select>"#;
        let students = parse_student_options(html).unwrap();
        assert_eq!(students, vec![("DUPONT Jean".to_string(), "77".to_string())]);
    }

    #[test]
    fn test_parse_student_calendar() {
        let html = r#"<table class="tabCalendrierEleve"><tr><td>
            <span class="corp">12/01/2024
                De 10h10 à 11h00 - Maladie sans certif/rdv med
                De 11h00 à 12h00 - Maladie sans certif/rdv med
            </span>
            <span class="corp">15/01/2024
                Journée - Raison familiale
            </span>
        </td></tr></table>"#;
        let entries = parse_student_calendar(html).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date_dmy, "12/01/2024");
        assert_eq!(entries[0].motives.len(), 2);
        assert_eq!(entries[0].motives[0], "De 10h10 à 11h00 - Maladie sans certif/rdv med");
        assert_eq!(entries[1].motives, vec!["Journée - Raison familiale".to_string()]);
    }

    #[test]
    fn test_sheet_from_json() {
        let grades_json = json!({
            "eleves": [
                {"eleveid": 7, "nom": "DUPONT", "prenom": "Jean",
                 "notes": [{"iddevoir": 3, "note": "12,5"}]},
                {"eleveid": 8, "nom": "MARTIN", "prenom": "Luc",
                 "notes": [{"iddevoir": 3, "note": ""}]}
            ],
            "evaluations": [
                {"id": 3, "titre": "DS1", "noteMaximalEvaluation": 20,
                 "coefficient": 1, "dateDevoir": "2024-01-12"}
            ]
        });
        let sheet = sheet_from_json(&grades_json);
        assert_eq!(sheet.students.len(), 2);
        assert_eq!(sheet.students[0].name, "DUPONT Jean");
        assert_eq!(sheet.grade_of("3", "7"), Some("12,5"));
        assert_eq!(sheet.evaluations[0].date_ymd.as_deref(), Some("2024-01-12"));
        assert_eq!(sheet.evaluations[0].max_grade, 20.0);
    }
}
