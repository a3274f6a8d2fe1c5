//! Agent profile rows.

use rusqlite::params;

use crate::model::AgentProfile;

use super::{map_sql_err, Store, StoreError};

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentProfile> {
    Ok(AgentProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        system_prompt: row.get(3)?,
        persona: row.get(4)?,
        guardrails: row.get(5)?,
    })
}

impl Store {
    pub async fn save_agent(&self, agent: &AgentProfile) -> Result<(), StoreError> {
        let agent = agent.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO agent (id, name, description, system_prompt, persona, guardrails) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET \
                     name = excluded.name, \
                     description = excluded.description, \
                     system_prompt = excluded.system_prompt, \
                     persona = excluded.persona, \
                     guardrails = excluded.guardrails",
                params![
                    agent.id,
                    agent.name,
                    agent.description,
                    agent.system_prompt,
                    agent.persona,
                    agent.guardrails,
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn get_agent(&self, id: &str) -> Result<AgentProfile, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, name, description, system_prompt, persona, guardrails \
                 FROM agent WHERE id = ?1",
                params![id],
                row_to_agent,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("agent {}", id))
                }
                other => map_sql_err(other),
            })
        })
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentProfile>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, system_prompt, persona, guardrails \
                     FROM agent ORDER BY id",
                )
                .map_err(map_sql_err)?;
            let rows = stmt.query_map([], row_to_agent).map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Agent rows round-trip including optional parts.
    #[tokio::test(flavor = "multi_thread")]
    async fn agent_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut agent = AgentProfile::new("researcher", "Researcher", "You research things.");
        agent.guardrails = Some("Cite sources.".into());
        store.save_agent(&agent).await.unwrap();

        let loaded = store.get_agent("researcher").await.unwrap();
        assert_eq!(loaded.name, "Researcher");
        assert_eq!(loaded.guardrails.as_deref(), Some("Cite sources."));
        assert!(loaded.persona.is_none());
    }
}
