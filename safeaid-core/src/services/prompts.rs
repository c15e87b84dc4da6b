//! Prompt templates and fixed reply texts.

use serde::Serialize;

use crate::services::helplines::Helpline;
use crate::services::messages::{Message, MessageRole};
use crate::services::techniques::Technique;

pub const CONSENT_REQUIRED: &str = "I'd be happy to help, but I need your consent first. Please review and accept the terms to continue our conversation.";

/// Reply used when handling a message fails for any reason.
pub const SAFETY_REDIRECT: &str = "I'm sorry, I'm having trouble right now. If you're in crisis, please contact your local emergency services or a crisis helpline immediately.";

/// Reply used when the supportive path cannot assemble its prompt.
pub const BREATHING_OFFER: &str = "I understand you're going through a difficult time. Sometimes it helps to take a few deep breaths. Would you like me to guide you through a simple breathing exercise?";

const SYSTEM_PROMPT: &str = r#"You are "SafeAid", a mental health first-aid assistant. You must be empathetic, concise, and non-judgmental.

CRITICAL SAFETY RULES:
- You may provide grounding and breathing techniques
- You must NEVER provide medical diagnosis or therapy
- If the user expresses suicidal intent or immediate danger, stop the flow and give emergency instructions
- Keep responses short (2-4 sentences) and actionable
- Always be supportive and validate feelings
- Offer practical coping strategies when appropriate

Your role is to provide emotional support and guide users to appropriate resources when needed."#;

const SAFETY_PROMPT: &str = r#"SAFETY GUIDELINES:
- Never ask leading questions about self-harm
- Do not provide medical advice or diagnosis
- Always prioritize user safety
- If crisis detected, provide immediate helpline information
- Encourage professional help when appropriate"#;

const SAFE_MODE_PROMPT: &str = r#"You are in Safe Conversation Mode. Your role is to provide reflective listening and emotional support.

SAFE MODE GUIDELINES:
- Use reflective listening techniques
- Validate the user's feelings without judgment
- Ask gentle, open-ended questions to help them process
- Avoid giving advice unless specifically asked
- Focus on being present and supportive
- Keep responses empathetic and brief"#;

const CRISIS_OPENING: &str =
    "I'm really sorry you're feeling this way. Your safety is the most important thing right now.";
const CRISIS_EMERGENCY_LINE: &str = "If you're in immediate danger, please call your local emergency number (911, 112, etc.) or go to your nearest emergency room.";
const CRISIS_NO_HELPLINES: &str = "Please call your local emergency number (911, 112, etc.) or go to your nearest emergency room immediately.";
const CRISIS_CLOSING: &str =
    "You don't have to go through this alone. There are people who want to help you.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Supportive prompt. `history` is oldest first; only its last `window`
/// turns are rendered.
pub fn build_chat_prompt(
    user_message: &str,
    history: &[Message],
    window: usize,
    techniques: &[Technique],
    helplines: &[Helpline],
) -> PromptPair {
    let mut system = format!("{SYSTEM_PROMPT}\n\n{SAFETY_PROMPT}");

    if !techniques.is_empty() {
        system.push_str("\n\nAVAILABLE TECHNIQUES:\n");
        for t in techniques {
            let description = t
                .description
                .as_deref()
                .unwrap_or("Breathing/grounding exercise");
            system.push_str(&format!("- {}: {}\n", t.title, description));
        }
    }

    if !helplines.is_empty() {
        system.push_str("\n\nEMERGENCY HELPLINES:\n");
        for h in helplines {
            system.push_str(&format!("- {}: {}\n", h.description, h.phone));
        }
    }

    PromptPair {
        system,
        user: user_turn(user_message, "CONVERSATION HISTORY:", history, window),
    }
}

/// Reflective-listening prompt for sessions in safe mode.
pub fn build_safe_mode_prompt(user_message: &str, history: &[Message], window: usize) -> PromptPair {
    PromptPair {
        system: SAFE_MODE_PROMPT.to_string(),
        user: user_turn(user_message, "CONVERSATION:", history, window),
    }
}

fn user_turn(user_message: &str, heading: &str, history: &[Message], window: usize) -> String {
    let mut context = String::new();
    let start = history.len().saturating_sub(window);
    let recent = &history[start..];
    if !recent.is_empty() {
        context.push_str("\n\n");
        context.push_str(heading);
        context.push('\n');
        for msg in recent {
            let role = match msg.role {
                MessageRole::User => "User",
                _ => "Assistant",
            };
            context.push_str(&format!("{role}: {}\n", msg.content));
        }
    }
    format!("{context}\n\nUser: {user_message}\n\nAssistant:")
}

/// Fixed crisis reply listing the given helplines, numbered.
pub fn build_crisis_response(helplines: &[Helpline]) -> String {
    let mut out = format!("{CRISIS_OPENING}\n\n");
    if helplines.is_empty() {
        out.push_str(CRISIS_NO_HELPLINES);
    } else {
        out.push_str("Please reach out for immediate help:\n\n");
        for (i, h) in helplines.iter().enumerate() {
            out.push_str(&format!("{}. {}: {}\n", i + 1, h.description, h.phone));
        }
        out.push('\n');
        out.push_str(CRISIS_EMERGENCY_LINE);
    }
    out.push_str("\n\n");
    out.push_str(CRISIS_CLOSING);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::helplines::HelplineType;
    use chrono::Utc;
    use serde_json::json;

    fn msg(role: MessageRole, content: &str) -> Message {
        Message {
            id: content.to_string(),
            session_id: "s".into(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            anonymized: false,
            flagged: false,
            classifier: None,
            crisis_detected: false,
        }
    }

    fn helpline(description: &str, phone: &str) -> Helpline {
        Helpline {
            id: phone.to_string(),
            country: "US".into(),
            region: None,
            description: description.to_string(),
            phone: phone.to_string(),
            kind: HelplineType::Suicide,
            priority: 1,
            metadata: json!({}),
            active: true,
        }
    }

    #[test]
    fn crisis_response_numbers_helplines() {
        let text = build_crisis_response(&[
            helpline("Emergency Services", "911"),
            helpline("US National Suicide Prevention Lifeline", "988"),
        ]);
        assert!(text.starts_with(CRISIS_OPENING));
        assert!(text.contains("1. Emergency Services: 911\n"));
        assert!(text.contains("2. US National Suicide Prevention Lifeline: 988\n"));
        assert!(text.contains(CRISIS_EMERGENCY_LINE));
        assert!(text.ends_with(CRISIS_CLOSING));
    }

    #[test]
    fn crisis_response_without_helplines_falls_back_to_emergency_number() {
        let text = build_crisis_response(&[]);
        assert!(text.contains(CRISIS_NO_HELPLINES));
        assert!(!text.contains("Please reach out"));
        assert!(text.ends_with(CRISIS_CLOSING));
    }

    #[test]
    fn chat_prompt_keeps_last_turns_in_order() {
        let history: Vec<Message> = (0..8)
            .map(|i| {
                let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Bot };
                msg(role, &format!("turn {i}"))
            })
            .collect();
        let p = build_chat_prompt("now", &history, 6, &[], &[]);
        assert!(!p.user.contains("turn 1\n"));
        assert!(p.user.contains("CONVERSATION HISTORY:\nUser: turn 2\nAssistant: turn 3\n"));
        assert!(p.user.ends_with("\n\nUser: now\n\nAssistant:"));
        assert!(!p.system.contains("AVAILABLE TECHNIQUES"));
    }

    #[test]
    fn chat_prompt_lists_techniques_and_helplines() {
        let technique = Technique {
            id: "t".into(),
            key: "box_breathing".into(),
            title: "Box Breathing".into(),
            locale: "en".into(),
            steps: vec!["breathe".into()],
            duration_seconds: 60,
            active: true,
            description: None,
            category: None,
        };
        let p = build_chat_prompt("hi", &[], 6, &[technique], &[helpline("Samaritans", "116 123")]);
        assert!(p.system.contains("AVAILABLE TECHNIQUES:\n- Box Breathing: Breathing/grounding exercise\n"));
        assert!(p.system.contains("EMERGENCY HELPLINES:\n- Samaritans: 116 123\n"));
        assert_eq!(p.user, "\n\nUser: hi\n\nAssistant:");
    }

    #[test]
    fn safe_mode_prompt_uses_wider_window() {
        let history: Vec<Message> = (0..10).map(|i| msg(MessageRole::User, &format!("m{i}"))).collect();
        let p = build_safe_mode_prompt("hello", &history, 8);
        assert!(p.system.starts_with("You are in Safe Conversation Mode."));
        assert!(p.user.contains("CONVERSATION:\nUser: m2\n"));
        assert!(!p.user.contains("m1\n"));
    }
}
