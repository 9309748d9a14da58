//! Company operations for the `companies` table.
//!
//! The ingestion pipeline only needs an existence check and a
//! duplicate-safe batch insert; the remaining queries back the
//! incomplete-record scan and diagnostics.

use crate::error::{DatabaseError, Result};
use bluechip_core::{Address, CompanyNumber, Coordinates, Entity};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, Pool, Row, Sqlite, SqliteConnection};

/// Check whether a company is already recorded.
///
/// # Errors
/// Returns `DatabaseError::Sqlx` if the query fails.
pub async fn company_exists(conn: &mut SqliteConnection, number: &CompanyNumber) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM companies WHERE company_number = ?)",
    )
    .bind(number.as_str())
    .fetch_one(conn)
    .await?;

    Ok(found != 0)
}

/// Insert a batch of companies in one transaction.
///
/// Rows whose company number is already present are skipped rather than
/// failing the batch. Returns the number of rows actually written.
///
/// # Errors
/// Returns `DatabaseError` if serialization or any insert fails; the
/// transaction is rolled back in that case.
pub async fn insert_companies(conn: &mut SqliteConnection, entities: &[Entity]) -> Result<u64> {
    let created_at = Utc::now().to_rfc3339();
    let mut tx = conn.begin().await?;
    let mut written = 0;

    for entity in entities {
        let sic_codes = serde_json::to_string(&entity.sic_codes)?;
        let (latitude, longitude) = match entity.coordinates {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };

        let result = sqlx::query(
            "INSERT OR IGNORE INTO companies (company_number, name, sic_codes, address_line_1,
                                              address_line_2, locality, postal_code, region,
                                              latitude, longitude, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entity.company_number.as_str())
        .bind(&entity.name)
        .bind(&sic_codes)
        .bind(&entity.address.line_1)
        .bind(&entity.address.line_2)
        .bind(&entity.address.locality)
        .bind(&entity.address.postal_code)
        .bind(&entity.address.region)
        .bind(latitude)
        .bind(longitude)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Fetch a single company by number.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or the row cannot be decoded.
pub async fn get_company(pool: &Pool<Sqlite>, number: &CompanyNumber) -> Result<Option<Entity>> {
    let row = sqlx::query(
        "SELECT company_number, name, sic_codes, address_line_1, address_line_2, locality,
                postal_code, region, latitude, longitude
         FROM companies WHERE company_number = ?",
    )
    .bind(number.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_entity).transpose()
}

/// Count stored companies.
///
/// # Errors
/// Returns `DatabaseError::Sqlx` if the query fails.
pub async fn count_companies(pool: &Pool<Sqlite>) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM companies")
        .fetch_one(pool)
        .await?)
}

/// List companies whose stored record is missing a name, SIC codes, the
/// first address line, locality, postal code or coordinates.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a stored number is malformed.
pub async fn find_incomplete(pool: &Pool<Sqlite>) -> Result<Vec<CompanyNumber>> {
    let numbers: Vec<String> = sqlx::query_scalar(
        "SELECT company_number FROM companies
         WHERE TRIM(name) = ''
            OR sic_codes = '[]'
            OR COALESCE(TRIM(address_line_1), '') = ''
            OR COALESCE(TRIM(locality), '') = ''
            OR COALESCE(TRIM(postal_code), '') = ''
            OR latitude IS NULL
            OR longitude IS NULL
         ORDER BY company_number",
    )
    .fetch_all(pool)
    .await?;

    numbers.into_iter().map(decode_number).collect()
}

fn decode_number(raw: String) -> Result<CompanyNumber> {
    CompanyNumber::new(raw.clone())
        .map_err(|e| DatabaseError::Decode(format!("stored company number '{raw}': {e}")))
}

fn row_to_entity(row: &SqliteRow) -> Result<Entity> {
    let sic_codes: String = row.try_get("sic_codes")?;
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;

    Ok(Entity {
        company_number: decode_number(row.try_get("company_number")?)?,
        name: row.try_get("name")?,
        sic_codes: serde_json::from_str(&sic_codes)?,
        address: Address {
            line_1: row.try_get("address_line_1")?,
            line_2: row.try_get("address_line_2")?,
            locality: row.try_get("locality")?,
            postal_code: row.try_get("postal_code")?,
            region: row.try_get("region")?,
        },
        coordinates: latitude
            .zip(longitude)
            .map(|(latitude, longitude)| Coordinates {
                latitude,
                longitude,
            }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup() -> Database {
        let db = Database::new(":memory:").await.expect("create db");
        db.run_migrations().await.expect("run migrations");
        db
    }

    fn number(raw: &str) -> CompanyNumber {
        CompanyNumber::new(raw).expect("valid company number")
    }

    fn complete_entity(raw: &str) -> Entity {
        Entity {
            company_number: number(raw),
            name: format!("Company {raw} Ltd"),
            sic_codes: vec!["62020".to_string()],
            address: Address {
                line_1: Some("1 High Street".to_string()),
                line_2: None,
                locality: Some("Swindon".to_string()),
                postal_code: Some("SN1 1AA".to_string()),
                region: None,
            },
            coordinates: Some(Coordinates {
                latitude: 51.56,
                longitude: -1.78,
            }),
        }
    }

    #[tokio::test]
    async fn test_insert_and_exists() {
        let db = setup().await;
        let mut conn = db.acquire().await.expect("acquire");

        assert!(!company_exists(&mut conn, &number("00000001"))
            .await
            .expect("exists query"));

        let written = insert_companies(&mut conn, &[complete_entity("00000001")])
            .await
            .expect("insert");
        assert_eq!(written, 1);

        assert!(company_exists(&mut conn, &number("00000001"))
            .await
            .expect("exists query"));
    }

    #[tokio::test]
    async fn test_insert_skips_duplicates() {
        let db = setup().await;
        let mut conn = db.acquire().await.expect("acquire");

        insert_companies(&mut conn, &[complete_entity("00000001")])
            .await
            .expect("first insert");
        let written = insert_companies(
            &mut conn,
            &[complete_entity("00000001"), complete_entity("00000002")],
        )
        .await
        .expect("second insert");

        assert_eq!(written, 1);
        drop(conn);
        assert_eq!(count_companies(db.pool()).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn test_get_company_round_trips_fields() {
        let db = setup().await;
        let mut entity = complete_entity("SC123456");
        entity.coordinates = None;
        {
            let mut conn = db.acquire().await.expect("acquire");
            insert_companies(&mut conn, std::slice::from_ref(&entity))
                .await
                .expect("insert");
        }

        let stored = get_company(db.pool(), &entity.company_number)
            .await
            .expect("get company")
            .expect("company present");
        assert_eq!(stored, entity);

        assert!(get_company(db.pool(), &number("99999999"))
            .await
            .expect("get company")
            .is_none());
    }

    #[tokio::test]
    async fn test_find_incomplete() {
        let db = setup().await;

        let mut no_coordinates = complete_entity("00000002");
        no_coordinates.coordinates = None;
        let mut no_sic = complete_entity("00000003");
        no_sic.sic_codes.clear();
        let mut no_locality = complete_entity("00000004");
        no_locality.address.locality = Some("  ".to_string());

        {
            let mut conn = db.acquire().await.expect("acquire");
            insert_companies(
                &mut conn,
                &[
                    complete_entity("00000001"),
                    no_coordinates,
                    no_sic,
                    no_locality,
                ],
            )
            .await
            .expect("insert");
        }

        let incomplete = find_incomplete(db.pool()).await.expect("find incomplete");
        assert_eq!(
            incomplete,
            vec![number("00000002"), number("00000003"), number("00000004")]
        );
    }
}
