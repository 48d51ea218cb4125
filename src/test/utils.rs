#[cfg(test)]
pub mod test_db {
    use crate::aggregate::AverageService;
    use crate::db::{SqliteAverageStore, SqliteScoreStore, create_progress_record};
    use crate::error::AppError;
    use crate::models::ClassAverage;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Once;
    use uuid::Uuid;

    static INIT: Once = Once::new();

    #[derive(Default)]
    pub struct TestDbBuilder {
        students: Vec<TestStudent>,
        scores: Vec<TestScore>,
    }

    pub struct TestStudent {
        pub name: String,
        pub full_name: String,
    }

    pub struct TestScore {
        pub student: String,
        pub classroom_id: String,
        pub subject: String,
        pub score: f64,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn student(mut self, name: &str, full_name: &str) -> Self {
            self.students.push(TestStudent {
                name: name.to_string(),
                full_name: full_name.to_string(),
            });
            self
        }

        pub fn score(mut self, student: &str, classroom_id: &str, subject: &str, score: f64) -> Self {
            self.scores.push(TestScore {
                student: student.to_string(),
                classroom_id: classroom_id.to_string(),
                subject: subject.to_string(),
                score,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            // One connection per in-memory database, otherwise every
            // pooled connection would see its own empty database.
            let primary = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;
            let analytics = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&primary).await?;
            sqlx::migrate!("./migrations_analytics")
                .run(&analytics)
                .await?;

            let mut student_id_map: HashMap<String, String> = HashMap::new();

            for student in &self.students {
                let id = Uuid::new_v4().to_string();

                sqlx::query("INSERT INTO profiles (id, full_name) VALUES (?, ?)")
                    .bind(&id)
                    .bind(&student.full_name)
                    .execute(&primary)
                    .await?;

                student_id_map.insert(student.name.clone(), id);
            }

            let mut score_ids = Vec::new();

            for score in &self.scores {
                let student_id = student_id_map
                    .get(&score.student)
                    .cloned()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());

                let record = create_progress_record(
                    &primary,
                    &student_id,
                    &score.classroom_id,
                    "school-1",
                    &score.subject,
                    score.score,
                )
                .await?;

                score_ids.push(record.id);
            }

            Ok(TestDb {
                primary,
                analytics,
                student_id_map,
                score_ids,
            })
        }
    }

    pub struct TestDb {
        pub primary: Pool<Sqlite>,
        pub analytics: Pool<Sqlite>,
        pub student_id_map: HashMap<String, String>,
        pub score_ids: Vec<String>,
    }

    impl TestDb {
        pub fn student_id(&self, name: &str) -> Option<String> {
            self.student_id_map.get(name).cloned()
        }

        pub fn service(&self) -> AverageService {
            AverageService::new(
                Arc::new(SqliteScoreStore::new(self.primary.clone())),
                Arc::new(SqliteAverageStore::new(self.analytics.clone())),
            )
        }

        pub async fn average_row_count(&self, classroom_id: &str) -> Result<i64, sqlx::Error> {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM class_averages WHERE classroom_id = ?")
                    .bind(classroom_id)
                    .fetch_one(&self.analytics)
                    .await?;

            Ok(count)
        }

        pub async fn stored_average(
            &self,
            classroom_id: &str,
        ) -> Result<Option<ClassAverage>, AppError> {
            crate::db::get_class_average(&self.analytics, classroom_id).await
        }
    }
}

#[cfg(test)]
pub mod fakes {
    use crate::aggregate::{AverageStore, ScoreStore};
    use crate::error::AppError;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub struct FakeScoreStore {
        scores: Vec<f64>,
        fail_with: Option<String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeScoreStore {
        pub fn new(scores: Vec<f64>) -> Self {
            Self {
                scores,
                fail_with: None,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                scores: Vec::new(),
                fail_with: Some(message.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn slow(scores: Vec<f64>, delay: Duration) -> Self {
            Self {
                scores,
                fail_with: None,
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[rocket::async_trait]
    impl ScoreStore for FakeScoreStore {
        async fn fetch_scores(&self, _classroom_id: &str) -> Result<Vec<f64>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(message) = &self.fail_with {
                return Err(AppError::Store(message.clone()));
            }

            Ok(self.scores.clone())
        }
    }

    #[derive(Default)]
    pub struct FakeAverageStore {
        entries: Mutex<HashMap<String, (f64, DateTime<Utc>)>>,
        fail_remaining: AtomicUsize,
        fail_message: String,
        calls: AtomicUsize,
    }

    impl FakeAverageStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_next(times: usize, message: &str) -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                fail_remaining: AtomicUsize::new(times),
                fail_message: message.to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn stored(&self, classroom_id: &str) -> Option<(f64, DateTime<Utc>)> {
            self.entries.lock().unwrap().get(classroom_id).copied()
        }

        pub fn row_count(&self) -> usize {
            self.entries.lock().unwrap().len()
        }
    }

    #[rocket::async_trait]
    impl AverageStore for FakeAverageStore {
        async fn upsert_average(
            &self,
            classroom_id: &str,
            average: f64,
            calculated_at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::Store(self.fail_message.clone()));
            }

            self.entries
                .lock()
                .unwrap()
                .insert(classroom_id.to_string(), (average, calculated_at));

            Ok(())
        }
    }
}
