use anyhow::{Context, Result};
use rusqlite::params;

use crate::db::{models::DriverSetting, Database};

impl Database {
    /// Inserts a row for each name not seen before (enabled by default) and returns
    /// every stored setting.
    pub async fn ensure_driver_settings(&self, names: Vec<String>) -> Result<Vec<DriverSetting>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for name in &names {
                tx.execute(
                    "INSERT OR IGNORE INTO driver_settings (name, enabled) VALUES (?1, 1)",
                    params![name],
                )
                .with_context(|| format!("failed to seed driver setting {name}"))?;
            }

            let settings = {
                let mut stmt =
                    tx.prepare("SELECT name, enabled FROM driver_settings ORDER BY name ASC")?;
                let rows = stmt.query_map([], |row| {
                    Ok(DriverSetting {
                        name: row.get("name")?,
                        enabled: row.get("enabled")?,
                    })
                })?;
                let mut settings = Vec::new();
                for row in rows {
                    settings.push(row?);
                }
                settings
            };

            tx.commit()?;
            Ok(settings)
        })
        .await
    }

    pub async fn set_driver_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let name = name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO driver_settings (name, enabled) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET enabled = excluded.enabled",
                params![name, enabled],
            )
            .with_context(|| format!("failed to update driver setting {name}"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_settings_keep_user_choice() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("settings.sqlite3")).unwrap();

        let seeded = db
            .ensure_driver_settings(vec!["Light".into(), "Proximity".into()])
            .await
            .unwrap();
        assert!(seeded.iter().all(|s| s.enabled));

        db.set_driver_enabled("Light", false).await.unwrap();
        let again = db
            .ensure_driver_settings(vec!["Light".into(), "Proximity".into()])
            .await
            .unwrap();

        assert_eq!(
            again,
            vec![
                DriverSetting { name: "Light".into(), enabled: false },
                DriverSetting { name: "Proximity".into(), enabled: true },
            ]
        );
    }
}
