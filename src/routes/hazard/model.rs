use std::sync::Arc;

use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

// The full hazard list is cached wholesale and dropped on every write.
// Concurrent remote writers are only visible after the next refresh.
const HAZARD_CACHE_KEY: &str = "hazards:all";
const HAZARD_CACHE_EXPIRE: u64 = 300;

/// Geographic position of a hazard marker. Equality is exact on both
/// coordinates; the duplicate-location check deliberately uses no distance
/// tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardCategory {
    Weather,
    Construction,
    Hazard,
}

impl HazardCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weather" => Some(Self::Weather),
            "construction" => Some(Self::Construction),
            "hazard" => Some(Self::Hazard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Construction => "construction",
            Self::Hazard => "hazard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Hazard {
    pub hazard_id: String,
    pub user_id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Hazard {
    pub fn position(&self) -> Position {
        Position {
            lat: self.latitude,
            lng: self.longitude,
        }
    }
}

/// Hazard as returned to API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct HazardInfo {
    pub hazard_id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub position: Position,
    pub reported_at: String,
    pub user_id: String,
    pub image_url: Option<String>,
}

impl From<Hazard> for HazardInfo {
    fn from(hazard: Hazard) -> Self {
        HazardInfo {
            hazard_id: hazard.hazard_id,
            category: hazard.category,
            title: hazard.title,
            description: hazard.description,
            position: Position {
                lat: hazard.latitude,
                lng: hazard.longitude,
            },
            reported_at: hazard.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            user_id: hazard.user_id,
            image_url: hazard.image_url,
        }
    }
}

/// An accepted submission, ready to persist. The image has already been
/// uploaded at this point.
#[derive(Debug)]
pub struct NewHazard {
    pub user_id: String,
    pub category: HazardCategory,
    pub title: String,
    pub description: String,
    pub position: Position,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteHazardRequest {
    pub hazard_id: String,
}

impl Hazard {
    pub async fn list_all(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
    ) -> Result<Vec<HazardInfo>, sqlx::Error> {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(HAZARD_CACHE_KEY).await;

            if let Ok(json_str) = cached {
                if let Ok(hazards) = serde_json::from_str::<Vec<HazardInfo>>(&json_str) {
                    tracing::debug!("Hazard list served from cache");
                    return Ok(hazards);
                }
            }
        }

        let hazards = sqlx::query_as::<_, Hazard>(
            r#"
            SELECT hazard_id, user_id, category, title, description,
                   latitude, longitude, image_url, created_at
            FROM hazards
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(HazardInfo::from)
        .collect::<Vec<_>>();

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(&hazards) {
                let _: Result<(), redis::RedisError> = conn
                    .set_ex(HAZARD_CACHE_KEY, json_str, HAZARD_CACHE_EXPIRE)
                    .await;
            }
        }

        Ok(hazards)
    }

    pub async fn find_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Hazard>(
            r#"
            SELECT hazard_id, user_id, category, title, description,
                   latitude, longitude, image_url, created_at
            FROM hazards
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, hazard_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Hazard>(
            r#"
            SELECT hazard_id, user_id, category, title, description,
                   latitude, longitude, image_url, created_at
            FROM hazards
            WHERE hazard_id = $1
            "#,
        )
        .bind(hazard_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        new: NewHazard,
    ) -> Result<Self, sqlx::Error> {
        let hazard_id = Uuid::new_v4().to_string();

        let hazard = sqlx::query_as::<_, Hazard>(
            r#"
            INSERT INTO hazards (hazard_id, user_id, category, title, description,
                                 latitude, longitude, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING hazard_id, user_id, category, title, description,
                      latitude, longitude, image_url, created_at
            "#,
        )
        .bind(&hazard_id)
        .bind(&new.user_id)
        .bind(new.category.as_str())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.position.lat)
        .bind(new.position.lng)
        .bind(&new.image_url)
        .fetch_one(pool)
        .await?;

        Self::invalidate_cache(redis).await;

        Ok(hazard)
    }

    /// Deletes a hazard scoped by owner. The ownership check happens in the
    /// handler; scoping the delete by user as well keeps a racing session
    /// from removing somebody else's marker.
    pub async fn delete(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        user_id: &str,
        hazard_id: &str,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM hazards
            WHERE hazard_id = $1 AND user_id = $2
            "#,
        )
        .bind(hazard_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Self::invalidate_cache(redis).await;

        Ok(())
    }

    async fn invalidate_cache(redis: &Arc<RedisClient>) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let _: Result<(), redis::RedisError> = conn.del(HAZARD_CACHE_KEY).await;
        }
    }
}
