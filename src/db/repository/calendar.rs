use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::like_pattern;
use crate::db::DatabaseError;
use crate::models::*;

/// Which professionals' events to show.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ProfessionalFilter {
    #[default]
    Any,
    /// Events of the listed professionals, plus unassigned ones when asked.
    Only {
        ids: Vec<i64>,
        include_unassigned: bool,
    },
    UnassignedOnly,
    /// Assigned to someone who is no longer a valid professional.
    Orphaned { valid_ids: Vec<i64> },
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// `[start, end)` window, in storage format.
    pub range: Option<(String, String)>,
    pub text: Option<String>,
    /// Colors matched in addition to the text query.
    pub color_hexes: Vec<String>,
    pub professional: ProfessionalFilter,
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: row.get(0)?,
        title: row.get(1)?,
        start: row.get(2)?,
        end: row.get(3)?,
        color: row.get(4)?,
        notes: row.get(5)?,
        profissional_id: row.get(6)?,
    })
}

const EVENT_COLUMNS: &str = r#"id, title, start, "end", color, notes, profissional_id"#;

/// Insert an event; `event.id` is ignored.
pub fn insert_event(conn: &Connection, event: &CalendarEvent) -> Result<i64, DatabaseError> {
    conn.execute(
        r#"INSERT INTO calendar_event (title, start, "end", color, notes, profissional_id)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            event.title,
            event.start,
            event.end,
            event.color,
            event.notes,
            event.profissional_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_event(conn: &Connection, id: i64) -> Result<Option<CalendarEvent>, DatabaseError> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM calendar_event WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], event_from_row).optional()?)
}

pub fn update_event(conn: &Connection, event: &CalendarEvent) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        r#"UPDATE calendar_event
           SET title = ?2, start = ?3, "end" = ?4, color = ?5, notes = ?6, profissional_id = ?7
           WHERE id = ?1"#,
        params![
            event.id,
            event.title,
            event.start,
            event.end,
            event.color,
            event.notes,
            event.profissional_id,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("CalendarEvent", event.id));
    }
    Ok(())
}

pub fn delete_event(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM calendar_event WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("CalendarEvent", id));
    }
    Ok(())
}

pub fn list_events(
    conn: &Connection,
    filter: &EventFilter,
) -> Result<Vec<CalendarEvent>, DatabaseError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some((start, end)) = &filter.range {
        clauses.push(r#""end" >= ? AND start < ?"#.into());
        values.push(Value::Text(start.clone()));
        values.push(Value::Text(end.clone()));
    }

    match &filter.professional {
        ProfessionalFilter::Any => {}
        ProfessionalFilter::Only {
            ids,
            include_unassigned,
        } => {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let in_list = if ids.is_empty() {
                "0".to_string()
            } else {
                format!("profissional_id IN ({placeholders})")
            };
            if *include_unassigned {
                clauses.push(format!("({in_list} OR profissional_id IS NULL)"));
            } else {
                clauses.push(in_list);
            }
            values.extend(ids.iter().map(|id| Value::Integer(*id)));
        }
        ProfessionalFilter::UnassignedOnly => {
            clauses.push("profissional_id IS NULL".into());
        }
        ProfessionalFilter::Orphaned { valid_ids } => {
            clauses.push("profissional_id IS NOT NULL".into());
            if !valid_ids.is_empty() {
                let placeholders = vec!["?"; valid_ids.len()].join(", ");
                clauses.push(format!("profissional_id NOT IN ({placeholders})"));
                values.extend(valid_ids.iter().map(|id| Value::Integer(*id)));
            }
        }
    }

    if let Some(text) = filter.text.as_deref().filter(|t| !t.trim().is_empty()) {
        let pattern = like_pattern(&text.to_lowercase());
        let mut alternatives = vec!["title LIKE ?".to_string(), "notes LIKE ?".to_string()];
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
        if !filter.color_hexes.is_empty() {
            let placeholders = vec!["?"; filter.color_hexes.len()].join(", ");
            alternatives.push(format!("lower(color) IN ({placeholders})"));
            values.extend(filter.color_hexes.iter().map(|c| Value::Text(c.to_lowercase())));
        }
        clauses.push(format!("({})", alternatives.join(" OR ")));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!("SELECT {EVENT_COLUMNS} FROM calendar_event {where_sql} ORDER BY start, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    fn event(title: &str, start: &str, end: &str, prof: Option<i64>) -> CalendarEvent {
        CalendarEvent {
            id: 0,
            title: title.into(),
            start: start.into(),
            end: Some(end.into()),
            color: None,
            notes: None,
            profissional_id: prof,
        }
    }

    fn titles(events: &[CalendarEvent]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    fn seeded() -> Connection {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        insert_event(&conn, &event("A", "2024-05-01T09:00:00", "2024-05-01T10:00:00", Some(1))).unwrap();
        insert_event(&conn, &event("B", "2024-05-02T09:00:00", "2024-05-02T10:00:00", Some(2))).unwrap();
        insert_event(&conn, &event("C", "2024-05-03", "2024-05-04", None)).unwrap();
        insert_event(&conn, &event("D", "2024-06-01T09:00:00", "2024-06-01T10:00:00", Some(9))).unwrap();
        conn
    }

    #[test]
    fn range_overlap() {
        let conn = seeded();
        let filter = EventFilter {
            range: Some(("2024-05-02".into(), "2024-05-04".into())),
            ..Default::default()
        };
        assert_eq!(titles(&list_events(&conn, &filter).unwrap()), vec!["B", "C"]);
    }

    #[test]
    fn professional_filters() {
        let conn = seeded();
        let only = EventFilter {
            professional: ProfessionalFilter::Only {
                ids: vec![1],
                include_unassigned: true,
            },
            ..Default::default()
        };
        assert_eq!(titles(&list_events(&conn, &only).unwrap()), vec!["A", "C"]);

        let unassigned = EventFilter {
            professional: ProfessionalFilter::UnassignedOnly,
            ..Default::default()
        };
        assert_eq!(titles(&list_events(&conn, &unassigned).unwrap()), vec!["C"]);

        let orphaned = EventFilter {
            professional: ProfessionalFilter::Orphaned {
                valid_ids: vec![1, 2],
            },
            ..Default::default()
        };
        assert_eq!(titles(&list_events(&conn, &orphaned).unwrap()), vec!["D"]);
    }

    #[test]
    fn text_matches_title_notes_or_color() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        let mut a = event("Consulta Ana", "2024-05-01T09:00:00", "2024-05-01T10:00:00", None);
        a.color = Some("#2563EB".into());
        let mut b = event("Retorno", "2024-05-01T11:00:00", "2024-05-01T12:00:00", None);
        b.notes = Some("trazer exames da ana".into());
        let mut c = event("Limpeza", "2024-05-01T13:00:00", "2024-05-01T14:00:00", None);
        c.color = Some("#2563eb".into());
        for e in [&a, &b, &c] {
            insert_event(&conn, e).unwrap();
        }

        let by_text = EventFilter {
            text: Some("ANA".into()),
            ..Default::default()
        };
        assert_eq!(titles(&list_events(&conn, &by_text).unwrap()), vec!["Consulta Ana", "Retorno"]);

        let by_color = EventFilter {
            text: Some("azul".into()),
            color_hexes: vec!["#2563eb".into()],
            ..Default::default()
        };
        assert_eq!(titles(&list_events(&conn, &by_color).unwrap()), vec!["Consulta Ana", "Limpeza"]);
    }

    #[test]
    fn update_and_delete() {
        let conn = seeded();
        let mut ev = get_event(&conn, 1).unwrap().unwrap();
        ev.color = Some("#22c55e".into());
        update_event(&conn, &ev).unwrap();
        assert_eq!(get_event(&conn, 1).unwrap().unwrap().color.as_deref(), Some("#22c55e"));

        delete_event(&conn, 1).unwrap();
        assert!(get_event(&conn, 1).unwrap().is_none());
        assert!(matches!(delete_event(&conn, 1), Err(DatabaseError::NotFound { .. })));
    }
}
