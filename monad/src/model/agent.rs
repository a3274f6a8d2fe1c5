//! Agent profiles: data-driven prompts used by background jobs.

use serde::{Deserialize, Serialize};

/// One agent profile. The composed system prompt is the base prompt, then a
/// `## Persona` section, then a `## Guardrails` section; empty parts are
/// omitted and the sections are separated by blank lines.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub persona: Option<String>,
    pub guardrails: Option<String>,
}

impl AgentProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            persona: None,
            guardrails: None,
        }
    }

    /// Composes the full system prompt from base, persona, and guardrails.
    pub fn compose_prompt(&self) -> String {
        let mut parts = Vec::new();
        if !self.system_prompt.trim().is_empty() {
            parts.push(self.system_prompt.trim().to_string());
        }
        if let Some(persona) = self.persona.as_deref() {
            if !persona.trim().is_empty() {
                parts.push(format!("## Persona\n{}", persona.trim()));
            }
        }
        if let Some(guardrails) = self.guardrails.as_deref() {
            if !guardrails.trim().is_empty() {
                parts.push(format!("## Guardrails\n{}", guardrails.trim()));
            }
        }
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Full composition: system, persona, guardrails with blank-line separators.
    #[test]
    fn compose_all_parts() {
        let mut agent = AgentProfile::new("a1", "helper", "Base prompt.");
        agent.persona = Some("Friendly.".into());
        agent.guardrails = Some("No secrets.".into());
        assert_eq!(
            agent.compose_prompt(),
            "Base prompt.\n\n## Persona\nFriendly.\n\n## Guardrails\nNo secrets."
        );
    }

    /// **Scenario**: Empty parts are omitted entirely, including their headers.
    #[test]
    fn compose_omits_empty_parts() {
        let mut agent = AgentProfile::new("a1", "helper", "Base prompt.");
        agent.persona = Some("  ".into());
        assert_eq!(agent.compose_prompt(), "Base prompt.");
        agent.persona = None;
        agent.guardrails = Some("Careful.".into());
        assert_eq!(
            agent.compose_prompt(),
            "Base prompt.\n\n## Guardrails\nCareful."
        );
    }
}
