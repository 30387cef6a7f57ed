use anyhow::Result;
use rusqlite::{params, Row};

use crate::{
    db::{connection::Database, helpers::parse_datetime},
    models::RoomRequest,
};

fn row_to_request(row: &Row) -> Result<RoomRequest> {
    let requested_at: String = row.get("requested_at")?;

    Ok(RoomRequest {
        id: row.get("id")?,
        building: row.get("building")?,
        room: row.get("room")?,
        requested_at: parse_datetime(&requested_at, "requested_at")?,
    })
}

impl Database {
    pub async fn insert_room_request(&self, request: &RoomRequest) -> Result<()> {
        let record = request.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO room_requests (id, building, room, requested_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.building,
                    record.room,
                    record.requested_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Requests for a building, newest first. `room` narrows to one room.
    pub async fn list_room_requests(
        &self,
        building: &str,
        room: Option<&str>,
    ) -> Result<Vec<RoomRequest>> {
        let building = building.to_string();
        let room = room.map(str::to_string);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, building, room, requested_at
                 FROM room_requests
                 WHERE building = ?1 AND (?2 IS NULL OR room = ?2)
                 ORDER BY requested_at DESC",
            )?;

            let mut rows = stmt.query(params![building, room])?;
            let mut requests = Vec::new();
            while let Some(row) = rows.next()? {
                requests.push(row_to_request(row)?);
            }

            Ok(requests)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn requests_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("roomwatch.sqlite3")).unwrap();
        let base = Utc.with_ymd_and_hms(2024, 10, 5, 8, 0, 0).unwrap();

        let first = RoomRequest::new("Old", "105", base);
        let second = RoomRequest::new("Old", "106", base + Duration::minutes(5));
        let third = RoomRequest::new("Old", "105", base + Duration::minutes(10));
        let elsewhere = RoomRequest::new("New", "105", base);
        for request in [&first, &second, &third, &elsewhere] {
            db.insert_room_request(request).await.unwrap();
        }

        let all = db.list_room_requests("Old", None).await.unwrap();
        assert_eq!(all, vec![third.clone(), second, first.clone()]);

        let room_105 = db.list_room_requests("Old", Some("105")).await.unwrap();
        assert_eq!(room_105, vec![third, first]);
    }
}
