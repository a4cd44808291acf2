use sqlx::Error as SqlxError;
use uuid::Uuid;

use crate::models::Property;
use crate::DbPool;

pub struct PropertyRepository {
    pool: DbPool,
}

impl PropertyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Property>, SqlxError> {
        sqlx::query_as::<_, Property>(r#"SELECT * FROM properties WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}
