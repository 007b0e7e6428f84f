//! AI assistant context builder and chat gateway client.
//!
//! The assistant answers member questions grounded in platform data. The
//! context builder narrows a free-text question to a targeted fetch: when
//! the question names a company, the same locator (and therefore the same
//! per-period field mapping) that powers onboarding supplies the matching
//! records — column-name knowledge lives in exactly one place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{AssistantGatewayConfig, PeriodSchema};
use crate::db::MemberDb;
use crate::error::CoreError;
use crate::gateway::{error_for_response, send_with_retry, GatewayError, RetryPolicy};
use crate::locator;
use crate::roster::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GatewayError>;
}

/// Data context attached to every assistant call.
///
/// Counts cover completed submissions only. `company_search_results` is
/// present when the question matched company names in the historical
/// record sets.
pub fn build_chat_context(
    db: &MemberDb,
    periods: &[PeriodSchema],
    question: &str,
) -> Result<serde_json::Value, CoreError> {
    let mut counts = serde_json::Map::new();
    let mut total: u64 = 0;
    for schema in periods {
        let count = db
            .period_completed_count(schema)
            .map_err(CoreError::LookupFailed)?;
        counts.insert(schema.period.to_string(), json!(count));
        total += count;
    }

    let mut context = json!({
        "survey_counts": serde_json::Value::Object(counts),
        "survey_summary": {
            "total_responses": total,
            "note": "All counts are for completed surveys only.",
        },
        "network_profiles_count": db.count_identities().map_err(CoreError::LookupFailed)?,
    });

    // Narrow the free-text question to a targeted fetch when it names a
    // company.
    let names = company_mentions(db, periods, question)?;
    if !names.is_empty() {
        let mut results = Vec::new();
        for name in names.iter().take(10) {
            for schema in periods {
                for record in db
                    .period_records_for_name(schema, name)
                    .map_err(CoreError::LookupFailed)?
                {
                    results.push(json!({
                        "company": record.company_name,
                        "period": record.period,
                        "contact_email": record.email,
                        "claimed": record.owner_id.is_some(),
                    }));
                }
            }
        }
        context["company_search_results"] = json!(results);
    }

    Ok(context)
}

/// Company names a free-text question refers to.
///
/// Tries the question as one phrase first; a conversational question rarely
/// matches whole, so each of its longer significant words is then searched
/// on its own and the union is re-scored against the full question.
fn company_mentions(
    db: &MemberDb,
    periods: &[PeriodSchema],
    question: &str,
) -> Result<Vec<String>, CoreError> {
    if question.trim().chars().count() < 2 {
        return Ok(Vec::new());
    }

    let mut names = locator::search_companies(db, periods, question)?;
    if names.is_empty() {
        let mut seen = std::collections::HashSet::new();
        for word in crate::util::significant_words(question)
            .iter()
            .filter(|w| w.len() >= 4)
            .take(5)
        {
            for name in locator::search_companies(db, periods, word)? {
                if crate::util::is_relevant(&name, question)
                    && seen.insert(crate::util::normalize_name(&name))
                {
                    names.push(name);
                }
            }
        }
    }
    Ok(names)
}

/// Role-aware system prompt. Field-level visibility is enforced in the
/// prompt, mirroring the platform's role model.
fn system_prompt(role: Role, context: &serde_json::Value) -> String {
    let visibility = match role {
        Role::Admin => "The caller is an administrator and may see all data, including contact emails.",
        Role::Member => "The caller is a member: share aggregate statistics and company names, never contact emails of other companies.",
        Role::Viewer => "The caller is a viewer: share only aggregate statistics, never per-company details.",
    };
    format!(
        "You are the membership network's data assistant. Answer only from the \
         context below; say so when the context does not cover the question. {}\n\
         Context:\n{}",
        visibility, context
    )
}

/// Answer a member question grounded in platform data.
pub async fn answer_question(
    db: &MemberDb,
    periods: &[PeriodSchema],
    chat: &dyn ChatProvider,
    role: Role,
    messages: &[ChatMessage],
) -> Result<String, CoreError> {
    let question = messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let context = build_chat_context(db, periods, question)?;
    let system = system_prompt(role, &context);
    Ok(chat.complete(&system, messages).await?)
}

// ============================================================================
// HTTP implementation (OpenAI-compatible chat completions)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

pub struct HttpChatProvider {
    config: AssistantGatewayConfig,
}

impl HttpChatProvider {
    pub fn new(config: AssistantGatewayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GatewayError> {
        let mut payload_messages = vec![json!({ "role": "system", "content": system })];
        for message in messages {
            payload_messages.push(json!({ "role": message.role, "content": message.content }));
        }

        let client = reqwest::Client::new();
        let resp = send_with_retry(
            client
                .post(format!(
                    "{}/chat/completions",
                    self.config.base_url.trim_end_matches('/')
                ))
                .bearer_auth(&self.config.api_key)
                .json(&json!({
                    "model": self.config.model,
                    "messages": payload_messages,
                    "temperature": 0.3,
                })),
            &RetryPolicy::default(),
        )
        .await?;

        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }

        let completion: CompletionResponse = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::InvalidResponse("completion had no choices".into()))
    }
}
