use anyhow::{anyhow, bail, Result};
use regex::Regex;
use reqwest::blocking::Client;
use serde_json::{json, Map, Value};

use crate::backend::{
    Backend, Credentials, Evaluation, GradeChanges, GradeSheet, Group, GroupHandle,
    RecipientKind, Student,
};
use crate::http;
use crate::trimester;

// Tab ids the api expects in the request signature.
const TAB_GRADES: u32 = 23;
const TAB_MESSAGES: u32 = 131;

/// Non-numeric marks travel as `|<n>`; n is a 1-based index here.
const GRADE_TRANSLATE: [&str; 8] = [
    "Absent", "Dispense", "NonNote", "Inapte", "NonRendu", "AbsentZero", "NonRenduZero",
    "Felicitations",
];

pub fn grade_parse(wire: &str) -> String {
    if let Some(rest) = wire.strip_prefix('|') {
        if let Ok(i) = rest.parse::<usize>() {
            if (1..=GRADE_TRANSLATE.len()).contains(&i) {
                return GRADE_TRANSLATE[i - 1].to_string();
            }
        }
    }
    wire.to_string()
}

pub fn grade_compose(grade: &str) -> String {
    if let Some(i) = GRADE_TRANSLATE.iter().position(|g| *g == grade) {
        format!("|{}", i + 1)
    } else {
        // The replace is here in case of a spreadsheet conversion.
        grade.replace('.', ",")
    }
}

fn donnees(response: &Value) -> Result<&Value> {
    response
        .get("donneesSec")
        .and_then(|d| d.get("donnees"))
        .ok_or_else(|| anyhow!("unexpected response format from the pronote api"))
}

/// Unwraps `donnees[key]["V"]`; with no key the response must carry a
/// single data key.
fn response_data<'a>(response: &'a Value, key: Option<&str>) -> Result<&'a Value> {
    let data = donnees(response)?;
    let obj = data.as_object()
        .ok_or_else(|| anyhow!("unexpected response format from the pronote api"))?;
    let entry = match key {
        Some(k) => obj.get(k)
            .ok_or_else(|| anyhow!("missing {} in a pronote api response", k))?,
        None => {
            if obj.len() != 1 {
                bail!("ambiguous pronote api response ({} data keys)", obj.len());
            }
            obj.values().next().expect("checked length")
        }
    };
    entry.get("V")
        .ok_or_else(|| anyhow!("unexpected response format from the pronote api"))
}

/// Shallow copy keeping only the given keys; the api echoes records
/// back trimmed this way.
fn filter_keys(data: &Value, keys: &[&str]) -> Value {
    let mut out = Map::new();
    if let Some(obj) = data.as_object() {
        for key in keys {
            if let Some(v) = obj.get(*key) {
                out.insert(key.to_string(), v.clone());
            }
        }
    }
    Value::Object(out)
}

fn find_in<'a>(list: &'a [Value], genre: Option<i64>, label: &str, substr: bool) -> Vec<&'a Value> {
    list.iter()
        .filter(|record| {
            if let Some(g) = genre {
                if record.get("G").and_then(Value::as_i64) != Some(g) {
                    return false;
                }
            }
            match record.get("L").and_then(Value::as_str) {
                Some(l) => {
                    if substr {
                        l.contains(label)
                    } else {
                        l == label
                    }
                }
                None => false,
            }
        })
        .collect()
}

/// Numbers come as json numbers or as strings with comma decimals.
fn num_of(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// The login page hands the session over in its `onload` attribute:
/// `Start ({h:'<session id>', a:<espace>, ...})`.
pub fn parse_session_start(page: &str) -> Result<(String, u32)> {
    let id_re = Regex::new(r"h\s*[:=]\s*'([0-9A-Fa-f]+)'").unwrap();
    let session_id = id_re.captures(page)
        .map(|c| c[1].to_string())
        .ok_or_else(|| anyhow!("could not find a session id in the pronote login page"))?;
    let espace_re = Regex::new(r"a\s*[:=]\s*(\d+)").unwrap();
    let espace = espace_re.captures(page)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(3); // teacher space
    Ok((session_id, espace))
}

fn root_of(login_url: &str) -> Result<String> {
    Regex::new(r"^(https://[^/]+/pronote)").unwrap()
        .captures(login_url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| anyhow!("incorrect url provided, aborting"))
}

pub struct PronoteSession {
    client: Client,
    root: String,
    session_id: String,
    espace: u32,
    order: u32,
    teacher: Value,
}

impl PronoteSession {
    /// Credential login on the portal's own form (`login=true` skips
    /// the ENT redirect). The session runs the api's plain exchange
    /// over TLS; the browser-side encrypted handshake is not carried.
    pub fn open(login_url: &str, creds: &Credentials) -> Result<Self> {
        let client = http::session_client()?;
        let page_url = if login_url.contains('?') {
            format!("{}&login=true", login_url)
        } else {
            format!("{}?login=true", login_url)
        };
        let page = http::get_text(&client, &page_url)?;
        let (session_id, espace) = parse_session_start(&page)?;
        let root = root_of(login_url)?;
        let mut session = Self {
            client,
            root,
            session_id,
            espace,
            order: 0,
            teacher: Value::Null,
        };
        session.call("FonctionParametres", None, json!({}))?;
        session.call(
            "Identification",
            None,
            json!({
                "genreConnexion": 0,
                "genreEspace": session.espace,
                "identifiant": creds.user,
                "pourENT": false,
                "enConnexionAuto": false,
                "demandeConnexionAuto": false,
                "enConnexionAppliMobile": false,
            }),
        )?;
        let auth = session.call(
            "Authentification",
            None,
            json!({
                "connexion": 0,
                "espace": session.espace,
                "challenge": creds.password,
            }),
        )?;
        let auth_data = donnees(&auth)?;
        if auth_data.get("cle").is_none() {
            bail!("authentification failure");
        }
        let params = session.call("ParametresUtilisateur", None, json!({}))?;
        session.teacher = donnees(&params)?
            .get("ressource")
            .cloned()
            .ok_or_else(|| anyhow!("unexpected user parameters from the pronote api"))?;
        println!("Authentification success");
        Ok(session)
    }

    /// One api function call. Every request posts the same envelope
    /// with an incrementing order number; the tab id rides in the
    /// request signature.
    fn call(&mut self, name: &str, tab: Option<u32>, mut data: Value) -> Result<Value> {
        self.order += 1;
        if let Some(tab) = tab {
            data["_Signature_"] = json!({ "onglet": tab });
        }
        let url = format!(
            "{}/appelfonction/{}/{}/{}",
            self.root, self.espace, self.session_id, self.order
        );
        let payload = json!({
            "session": self.session_id,
            "numeroOrdre": self.order.to_string(),
            "nom": name,
            "donneesSec": { "donnees": data, "nom": name },
        });
        let response = http::post_json(&self.client, &url, &payload)?;
        if let Some(error) = response.get("Erreur") {
            let title = error.get("Titre").and_then(Value::as_str).unwrap_or("unknown error");
            bail!("pronote api error on {}: {}", name, title);
        }
        Ok(response)
    }

    fn period_list(&mut self) -> Result<Value> {
        self.call("ListePeriodes", Some(TAB_GRADES), json!({}))
    }

    fn period_for_trimester(&mut self, trimester_nb: u8) -> Result<Value> {
        let response = self.period_list()?;
        let list = response_data(&response, Some("listePeriodes"))?
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow!("unexpected period list from the pronote api"))?;
        let label = format!("Trimestre {}", trimester_nb);
        let found = find_in(&list, None, &label, false);
        match found.as_slice() {
            [one] => Ok((*one).clone()),
            [] => bail!("no period named {} on the website", label),
            _ => bail!("multiple periods named {} on the website", label),
        }
    }

    fn group_service(&mut self, group: &Group, period: &Value) -> Result<Value> {
        let payload = json!({
            "Eleve": null,
            "Pilier": null,
            "Periode": period,
            "Ressource": group.pronote_data()?,
            "Professeur": filter_keys(&self.teacher, &["G", "L", "N"]),
        });
        let response = self.call("ListeServices", Some(TAB_GRADES), payload)?;
        let services = response_data(&response, Some("services"))?
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow!("unexpected service list from the pronote api"))?;
        match services.as_slice() {
            [one] => Ok(one.clone()),
            _ => bail!("expected exactly one service for group {}", group.name),
        }
    }

    fn recipients(&mut self, kind: RecipientKind) -> Result<Vec<Value>> {
        let genres = match kind {
            RecipientKind::Teacher => "[3]",
            RecipientKind::Staff => "[34]",
            RecipientKind::Student => "[4]",
            RecipientKind::Parent => "[5]",
        };
        let payload = json!({
            "genres": { "_T": 26, "V": genres },
            "pourMessagerie": true,
            "sansFiltreSurEleve": true,
            "avecFonctionPersonnel": true,
        });
        let response = self.call("ListePublics", Some(TAB_MESSAGES), payload)?;
        response_data(&response, Some("listePublics"))?
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow!("unexpected recipient list from the pronote api"))
    }
}

fn sheet_from_page_notes(data: &Value) -> GradeSheet {
    let mut sheet = GradeSheet::default();
    let empty = vec![];
    let students = data.pointer("/listeEleves/V").and_then(Value::as_array).unwrap_or(&empty);
    for student in students {
        sheet.students.push(Student {
            id: student["N"].as_str().unwrap_or("").to_string(),
            name: student["L"].as_str().unwrap_or("").to_string(),
        });
    }
    let devoirs = data.pointer("/listeDevoirs/V").and_then(Value::as_array).unwrap_or(&empty);
    for devoir in devoirs {
        let eval_id = devoir["N"].as_str().unwrap_or("").to_string();
        sheet.evaluations.push(Evaluation {
            id: eval_id.clone(),
            title: devoir["commentaire"].as_str().unwrap_or("").to_string(),
            max_grade: devoir.pointer("/bareme/V").map(num_of).unwrap_or(20.0),
            coefficient: devoir.pointer("/coefficient/V").map(num_of).unwrap_or(1.0),
            date_ymd: devoir.pointer("/date/V").and_then(Value::as_str).map(|s| s.to_string()),
            raw: devoir.clone(),
        });
        let marks = devoir.pointer("/listeEleves/V").and_then(Value::as_array).unwrap_or(&empty);
        for mark in marks {
            let student_id = mark["N"].as_str().unwrap_or("").to_string();
            let wire = mark.pointer("/Note/V").and_then(Value::as_str).unwrap_or("");
            sheet.grades.insert((eval_id.clone(), student_id), grade_parse(wire));
        }
    }
    sheet
}

impl Backend for PronoteSession {
    fn label(&self) -> &'static str {
        "pronote"
    }

    fn trimester_label_pattern(&self) -> &'static str {
        r"Trimestre (?:1|2|3)"
    }

    fn groups(&mut self) -> Result<Vec<Group>> {
        let response = self.call("listeClassesGroupes", Some(TAB_GRADES), json!({}))?;
        let list = response_data(&response, None)?
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow!("unexpected group list from the pronote api"))?;
        Ok(list
            .into_iter()
            .map(|data| Group {
                name: data["L"].as_str().unwrap_or("").to_string(),
                handle: GroupHandle::Pronote { data },
            })
            .collect())
    }

    /// Exact label match, and only on groups proper (G=2), not whole
    /// classes.
    fn resolve_group(&mut self, name: &str) -> Result<Group> {
        let response = self.call("listeClassesGroupes", Some(TAB_GRADES), json!({}))?;
        let list = response_data(&response, None)?
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow!("unexpected group list from the pronote api"))?;
        let found = find_in(&list, Some(2), name.trim(), false);
        match found.as_slice() {
            [one] => Ok(Group {
                name: name.trim().to_string(),
                handle: GroupHandle::Pronote { data: (*one).clone() },
            }),
            [] => {
                let known = find_in(&list, Some(2), "", true)
                    .iter()
                    .filter_map(|g| g.get("L").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ");
                bail!(
                    "unable to match group name \"{}\" to one of the group names on the website (full list: {})",
                    name, known
                )
            }
            _ => bail!("multiple groups named \"{}\" on the website", name),
        }
    }

    fn default_trimester(&mut self) -> Result<u8> {
        let response = self.period_list()?;
        let default = response_data(&response, Some("periodeParDefaut"))?;
        let label = default["L"].as_str().unwrap_or("");
        trimester::number_in(label)
            .ok_or_else(|| anyhow!("unexpected default period {} from the pronote api", label))
    }

    fn grade_sheet(&mut self, group: &Group, trimester: u8) -> Result<GradeSheet> {
        let period = self.period_for_trimester(trimester)?;
        let service = self.group_service(group, &period)?;
        let mut period_with_genre = period;
        period_with_genre["G"] = json!(2);
        let payload = json!({
            "periode": period_with_genre,
            "ressource": filter_keys(group.pronote_data()?, &["G", "N"]),
            "service": filter_keys(&service, &["N"]),
        });
        let response = self.call("PageNotes", Some(TAB_GRADES), payload)?;
        Ok(sheet_from_page_notes(donnees(&response)?))
    }

    fn upload_grades(
        &mut self,
        _group: &Group,
        _trimester: u8,
        sheet: &GradeSheet,
        changes: &GradeChanges,
    ) -> Result<()> {
        let names = sheet.student_names();
        let mut devoirs = vec![];
        for (eval_id, per_student) in changes {
            let mut students = vec![];
            for (student_id, grade) in per_student {
                let name = names.get(student_id)
                    .ok_or_else(|| anyhow!("student id {} is not on the grade sheet", student_id))?;
                students.push(json!({
                    "N": student_id,
                    "L": name,
                    "note": { "_T": 10, "V": grade_compose(grade) },
                }));
            }
            devoirs.push(json!({ "N": eval_id, "listeEleves": students }));
        }
        self.call("SaisieNotesUnitaire", Some(TAB_GRADES), json!({ "listeDevoirs": devoirs }))?;
        Ok(())
    }

    fn send_message(
        &mut self,
        query: &str,
        kind: RecipientKind,
        subject: &str,
        body: &str,
    ) -> Result<()> {
        let genre = match kind {
            RecipientKind::Teacher => 3,
            RecipientKind::Staff => 34,
            RecipientKind::Student => 4,
            RecipientKind::Parent => 5,
        };
        let candidates = self.recipients(kind)?;
        let found = find_in(&candidates, Some(genre), query, true);
        let recipient = match found.as_slice() {
            [one] => (*one).clone(),
            [] => bail!("partial recipient name {} not found in list", query),
            many => {
                let names = many
                    .iter()
                    .filter_map(|r| r.get("L").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n");
                bail!("partial recipient name {} matches multiple recipients:\n{}", query, names)
            }
        };
        let payload = json!({
            "objet": subject,
            "contenu": body,
            "listeDestinataires": [filter_keys(&recipient, &["N", "G", "L"])],
        });
        self.call("SaisieMessage", Some(TAB_MESSAGES), payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_parse_and_compose() {
        assert_eq!(grade_parse("|1"), "Absent");
        assert_eq!(grade_parse("|3"), "NonNote");
        assert_eq!(grade_parse("12,5"), "12,5");
        assert_eq!(grade_compose("Absent"), "|1");
        assert_eq!(grade_compose("12.5"), "12,5");
        assert_eq!(grade_compose("15"), "15");
    }

    #[test]
    fn test_response_data_single_key() {
        let r = json!({"donneesSec": {"donnees": {"listeX": {"V": [1, 2]}}}});
        assert_eq!(response_data(&r, None).unwrap(), &json!([1, 2]));
        assert_eq!(response_data(&r, Some("listeX")).unwrap(), &json!([1, 2]));
        assert!(response_data(&r, Some("other")).is_err());
    }

    #[test]
    fn test_find_in_filters_on_genre_and_label() {
        let list = vec![
            json!({"G": 1, "L": "1G7", "N": "a"}),
            json!({"G": 2, "L": "1G7", "N": "b"}),
            json!({"G": 2, "L": "1G79", "N": "c"}),
        ];
        let exact = find_in(&list, Some(2), "1G7", false);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0]["N"], "b");
        let sub = find_in(&list, Some(2), "1G7", true);
        assert_eq!(sub.len(), 2);
    }

    #[test]
    fn test_parse_session_start() {
        let page = r#"<body onload="try { Start ({h:'2EF44CB25A5E87D2', a:3, sCoA:true}) } catch (e) {}">"#;
        let (id, espace) = parse_session_start(page).unwrap();
        assert_eq!(id, "2EF44CB25A5E87D2");
        assert_eq!(espace, 3);
        assert!(parse_session_start("<body></body>").is_err());
    }

    #[test]
    fn test_filter_keys() {
        let record = json!({"N": "id1", "G": 3, "L": "DUPONT", "extra": 1});
        assert_eq!(filter_keys(&record, &["N", "G", "L"]),
                   json!({"N": "id1", "G": 3, "L": "DUPONT"}));
    }

    #[test]
    fn test_sheet_from_page_notes() {
        let data = json!({
            "listeEleves": {"V": [
                {"N": "e1", "L": "DUPONT Jean"},
                {"N": "e2", "L": "MARTIN Luc"}
            ]},
            "listeDevoirs": {"V": [
                {"N": "d1", "commentaire": "DS1",
                 "bareme": {"V": "20"}, "coefficient": {"V": "1"},
                 "date": {"V": "12/01/2024"},
                 "listeEleves": {"V": [
                     {"N": "e1", "L": "DUPONT Jean", "Note": {"V": "12,5"}},
                     {"N": "e2", "L": "MARTIN Luc", "Note": {"V": "|1"}}
                 ]}}
            ]}
        });
        let sheet = sheet_from_page_notes(&data);
        assert_eq!(sheet.students.len(), 2);
        assert_eq!(sheet.evaluations.len(), 1);
        assert_eq!(sheet.evaluations[0].max_grade, 20.0);
        assert_eq!(sheet.grade_of("d1", "e1"), Some("12,5"));
        assert_eq!(sheet.grade_of("d1", "e2"), Some("Absent"));
    }
}
