//! Prompt templates for summary and tag generation.

use crate::types::{EntityKind, TrendingEntity};

pub fn summary_system_prompt(locale: &str) -> String {
    format!(
        r#"You write short, RSS-friendly summaries of GitHub trending entries.

Example input:
{{"username": "openai", "repository_name": "gpt-4", "description": "Next-gen AI model", "language": "Python", "stars_since": 2500}}
Example output:
OpenAI's GPT-4 is a next-gen AI model trending with 2.5k new stars. Useful for developers exploring advanced NLP.

Rules:
1. One or two sentences of plain text written in {locale}.
2. State the project's purpose, its stack and why it is trending.
3. Mention the language and the star growth when they are given.
4. The summary must stand on its own without external context.
5. A few emojis are fine.
6. The only markup allowed is <br/>, <strong>text</strong> and <em>text</em>. No markdown."#
    )
}

pub fn summary_user_prompt(entity: &TrendingEntity, locale: &str) -> String {
    format!(
        "Summarize this GitHub trending {}. Output only the summary text, in {locale}.\n\nInput data:\n{}",
        noun(entity),
        entity.prompt_payload()
    )
}

pub fn tags_system_prompt() -> &'static str {
    r#"You assign 1-3 concise tags to GitHub trending entries.

Example input:
{"username": "GoogleCloudPlatform", "repository_name": "kubectl-ai", "description": "AI powered Kubernetes Assistant", "language": "Go", "stars_since": 1518}
Example output:
Kubernetes,AI Assistant,DevOps

Rules:
1. Pick the key technologies or domains from the name and description.
2. Prefer specific technologies over generic words.
3. Output 1-3 comma-separated values and nothing else.
4. Never use programming language names as tags; that is tracked separately.
5. Keep technical terms in English; write the rest in the requested language."#
}

pub fn tags_user_prompt(entity: &TrendingEntity, locale: &str) -> String {
    format!(
        "Generate tags for this GitHub trending {} as comma-separated values, in {locale}. \
         Do not include programming languages.\n\nInput data:\n{}",
        noun(entity),
        entity.prompt_payload()
    )
}

fn noun(entity: &TrendingEntity) -> &'static str {
    match entity.kind {
        EntityKind::Repository => "repository",
        EntityKind::Developer => "developer",
    }
}
