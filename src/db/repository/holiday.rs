use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

const HOLIDAY_COLUMNS: &str = "date, name, type, level, state, year, source, updated_at";

fn holiday_from_row(row: &Row<'_>) -> rusqlite::Result<Holiday> {
    Ok(Holiday {
        date: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        level: row.get(3)?,
        state: row.get(4)?,
        year: row.get(5)?,
        source: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn query_holidays(
    conn: &Connection,
    where_sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Holiday>, DatabaseError> {
    let sql = format!("SELECT {HOLIDAY_COLUMNS} FROM holidays {where_sql} ORDER BY date");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, holiday_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_holidays(conn: &Connection) -> Result<Vec<Holiday>, DatabaseError> {
    query_holidays(conn, "", [])
}

/// Holidays with `start <= date <= end` (ISO dates).
pub fn list_holidays_between(
    conn: &Connection,
    start: &str,
    end: &str,
) -> Result<Vec<Holiday>, DatabaseError> {
    query_holidays(conn, "WHERE date >= ?1 AND date <= ?2", params![start, end])
}

pub fn list_holidays_for_year(conn: &Connection, year: i32) -> Result<Vec<Holiday>, DatabaseError> {
    query_holidays(conn, "WHERE year = ?1", [year])
}

pub fn get_holiday(conn: &Connection, date: &str) -> Result<Option<Holiday>, DatabaseError> {
    let sql = format!("SELECT {HOLIDAY_COLUMNS} FROM holidays WHERE date = ?1");
    Ok(conn.query_row(&sql, [date], holiday_from_row).optional()?)
}

/// Insert or replace the holiday on `holiday.date`.
pub fn upsert_holiday(conn: &Connection, holiday: &Holiday) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO holidays (date, name, type, level, state, year, source, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(date) DO UPDATE SET
           name = excluded.name, type = excluded.type, level = excluded.level,
           state = excluded.state, year = excluded.year, source = excluded.source,
           updated_at = excluded.updated_at",
        params![
            holiday.date,
            holiday.name,
            holiday.kind,
            holiday.level,
            holiday.state,
            holiday.year,
            holiday.source,
            holiday.updated_at.unwrap_or_else(now),
        ],
    )?;
    Ok(())
}

/// Replace every holiday of `year` with `holidays`. Returns the number stored.
pub fn replace_year_holidays(
    conn: &Connection,
    year: i32,
    holidays: &[Holiday],
) -> Result<usize, DatabaseError> {
    conn.execute("DELETE FROM holidays WHERE year = ?1", [year])?;
    for holiday in holidays {
        upsert_holiday(conn, holiday)?;
    }
    Ok(holidays.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    fn holiday(date: &str, name: &str, year: i32) -> Holiday {
        Holiday {
            date: date.into(),
            name: name.into(),
            kind: Some("feriado".into()),
            level: Some("nacional".into()),
            state: None,
            year,
            source: "invertexto".into(),
            updated_at: None,
        }
    }

    #[test]
    fn range_and_year_queries() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        upsert_holiday(&conn, &holiday("2024-01-01", "Confraternização", 2024)).unwrap();
        upsert_holiday(&conn, &holiday("2024-04-21", "Tiradentes", 2024)).unwrap();
        upsert_holiday(&conn, &holiday("2025-01-01", "Confraternização", 2025)).unwrap();

        assert_eq!(list_holidays_for_year(&conn, 2024).unwrap().len(), 2);
        let between = list_holidays_between(&conn, "2024-04-01", "2025-01-01").unwrap();
        assert_eq!(between.len(), 2);
        assert_eq!(between[0].name, "Tiradentes");
    }

    #[test]
    fn replace_year_only_touches_that_year() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        upsert_holiday(&conn, &holiday("2024-01-01", "Velho", 2024)).unwrap();
        upsert_holiday(&conn, &holiday("2025-01-01", "Outro ano", 2025)).unwrap();

        let stored = replace_year_holidays(
            &conn,
            2024,
            &[holiday("2024-11-15", "República", 2024)],
        )
        .unwrap();
        assert_eq!(stored, 1);
        assert!(get_holiday(&conn, "2024-01-01").unwrap().is_none());
        assert!(get_holiday(&conn, "2025-01-01").unwrap().is_some());
        assert_eq!(list_holidays(&conn).unwrap().len(), 2);
    }
}
