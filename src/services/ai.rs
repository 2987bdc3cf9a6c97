use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::journal::Mood;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const SOURCE_CLAUDE: &str = "claude";
pub const SOURCE_FALLBACK: &str = "fallback";

const QUOTES: &[(&str, &str)] = &[
    ("The secret of getting ahead is getting started.", "Mark Twain"),
    ("It always seems impossible until it's done.", "Nelson Mandela"),
    ("Well done is better than well said.", "Benjamin Franklin"),
    ("Small deeds done are better than great deeds planned.", "Peter Marshall"),
    ("You don't have to see the whole staircase, just take the first step.", "Martin Luther King Jr."),
    ("What you do today can improve all your tomorrows.", "Ralph Marston"),
    ("Action is the foundational key to all success.", "Pablo Picasso"),
    ("The journey of a thousand miles begins with one step.", "Lao Tzu"),
    ("Quality is not an act, it is a habit.", "Aristotle"),
    ("Either you run the day or the day runs you.", "Jim Rohn"),
    ("Start where you are. Use what you have. Do what you can.", "Arthur Ashe"),
    ("Fill your paper with the breathings of your heart.", "William Wordsworth"),
];

const TIPS: &[&str] = &[
    "Write three lines in your journal before checking your phone in the morning.",
    "Break your biggest goal into milestones small enough to finish this week.",
    "Schedule your hardest todo first, while your focus is fresh.",
    "End the day by moving unfinished todos to tomorrow on purpose, not by default.",
    "Name your mood honestly. Patterns only show up in honest data.",
    "Review your long-term goals on Sunday and pick one milestone for the week.",
    "Keep todos concrete: a verb and an object, done in one sitting.",
    "When a streak breaks, restart the same day. Two missed days is the real risk.",
    "Limit yourself to three urgent todos. If everything is urgent, nothing is.",
    "Reread an old journal entry. Progress is easier to see from a distance.",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tip {
    pub text: String,
    pub source: String,
}

/// What the tip prompt knows about the user.
#[derive(Debug, Clone, Default)]
pub struct TipContext {
    pub current_streak: i32,
    pub pending_today: i64,
    pub overdue: i64,
    pub active_goals: i64,
    pub recent_moods: Vec<Mood>,
}

fn day_index(date: NaiveDate, len: usize) -> usize {
    date.ordinal0() as usize % len.max(1)
}

pub fn quote_of_the_day(date: NaiveDate) -> Quote {
    let (text, author) = QUOTES[day_index(date, QUOTES.len())];
    Quote {
        text: text.to_string(),
        author: Some(author.to_string()),
        source: SOURCE_FALLBACK.to_string(),
    }
}

/// Deterministic tip: the tip of the day, led by a nudge when the context
/// calls for one.
pub fn fallback_tip(date: NaiveDate, ctx: &TipContext) -> Tip {
    let daily = TIPS[day_index(date, TIPS.len())];
    let lead = if ctx.overdue > 0 {
        Some(format!(
            "You have {} overdue todo{}. Reschedule or finish one today.",
            ctx.overdue,
            if ctx.overdue == 1 { "" } else { "s" }
        ))
    } else if ctx.current_streak == 0 {
        Some("Log one small thing today to start a new streak.".to_string())
    } else if ctx.current_streak >= 7 {
        Some(format!("{} days in a row. Keep the chain going.", ctx.current_streak))
    } else {
        None
    };

    let text = match lead {
        Some(lead) => format!("{lead} {daily}"),
        None => daily.to_string(),
    };
    Tip {
        text,
        source: SOURCE_FALLBACK.to_string(),
    }
}

pub fn tip_prompt(ctx: &TipContext) -> String {
    let moods = if ctx.recent_moods.is_empty() {
        "none recorded".to_string()
    } else {
        ctx.recent_moods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"You are a supportive productivity coach inside a personal journaling app.

User context:
- current activity streak: {} days
- pending todos today: {}
- overdue todos: {}
- active goals: {}
- recent moods (newest first): {}

Reply with one practical tip of at most two sentences. Plain text only, no preamble."#,
        ctx.current_streak, ctx.pending_today, ctx.overdue, ctx.active_goals, moods
    )
}

const QUOTE_PROMPT: &str = r#"Give one short, genuine motivational quote from a real, well-known person.
Respond with JSON only, exactly this schema:
{"text": "the quote", "author": "the person"}"#;

/// Send one user message to the Messages API and return the first text block.
async fn complete(client: &reqwest::Client, config: &Config, prompt: &str, max_tokens: u32) -> anyhow::Result<String> {
    if !config.ai_enabled() {
        anyhow::bail!("CLAUDE_API_KEY not configured");
    }

    let response = client
        .post(MESSAGES_URL)
        .header("x-api-key", &config.claude_api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(&serde_json::json!({
            "model": config.claude_model,
            "max_tokens": max_tokens,
            "messages": [{
                "role": "user",
                "content": prompt
            }]
        }))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Claude API error {}: {}", status, body);
    }

    let body: serde_json::Value = response.json().await?;
    let text = body["content"][0]["text"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Claude response had no text content"))?;
    Ok(text.to_string())
}

pub async fn daily_quote(client: &reqwest::Client, config: &Config, today: NaiveDate) -> Quote {
    if !config.ai_enabled() {
        return quote_of_the_day(today);
    }

    let result = complete(client, config, QUOTE_PROMPT, 200)
        .await
        .and_then(|text| Ok(serde_json::from_str::<Quote>(&text)?));

    match result {
        Ok(mut quote) if !quote.text.trim().is_empty() => {
            quote.source = SOURCE_CLAUDE.to_string();
            quote
        }
        Ok(_) => quote_of_the_day(today),
        Err(e) => {
            tracing::warn!(error = %e, "Claude quote unavailable, using fallback");
            quote_of_the_day(today)
        }
    }
}

pub async fn contextual_tip(
    client: &reqwest::Client,
    config: &Config,
    today: NaiveDate,
    ctx: &TipContext,
) -> Tip {
    if !config.ai_enabled() {
        return fallback_tip(today, ctx);
    }

    match complete(client, config, &tip_prompt(ctx), 300).await {
        Ok(text) => Tip {
            text,
            source: SOURCE_CLAUDE.to_string(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Claude tip unavailable, using fallback");
            fallback_tip(today, ctx)
        }
    }
}
