//! crates/consult_chat_core/src/prompt.rs
//!
//! Renders the instruction template, patient metadata and prior turns into the
//! message payload sent to the inference service.
//!
//! Rendering is a single pass over the template: values substituted into a
//! placeholder are never scanned again, so user text containing `{name}` is
//! copied through untouched.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{PatientInfo, Speaker, Turn};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

const ARCHIVE_INSTRUCTIONS: &str = r#"
Use the following pieces of information to answer the user's question.
Give all possible answers from all the books regarding that question. If not found in your training books, answer from your pretrained data.
Must mention the book or source and page number with each answer.

Context: {context}
Chat History: {chat_history}
Question: {question}

Answer concisely and provide additional helpful insights if applicable.
"#;

const ARCHIVE_SYSTEM: &str = r#"Use the following pieces of information to answer the user's questions.
Give all possible answers from all the books regarding each question. If not found in your training books, answer from your pretrained data.
Must mention the book or source and page number with each answer.
Answer concisely and provide additional helpful insights if applicable.

Context: {context}"#;

const ARCHIVE_CONTEXT: &str = r#"You are trained on these books on historical events, relations, and key dates regarding Bangladesh:

Bangladesh: A Legacy of Blood
Author: Anthony Mascarenhas

The Blood Telegram: Nixon, Kissinger, and a Forgotten Genocide
Author: Gary J. Bass

Liberation War Debates in the UK Parliament
Author: UK Parliament

The Cruel Birth of Bangladesh Through the Eyes of America
Author: Adit Mahmood

The Rape of Bangladesh
Author: ANTHONY MASCARENHAS

Pakistan Failure in National Integration
Author: Rounaq Jahan
"#;

const INTAKE_INSTRUCTIONS: &str = r#"
{context}

Patient details:
Name: {name}
Age: {age}
Gender: {gender}
Location: {location}
Date of visit: {date}
Habits: {habits}

Conversation so far:
{chat_history}

Patient: {question}

Ask exactly one follow-up question at a time. Once the answers are enough to narrow it down, give the most likely causes and say clearly when the patient should see a doctor in person.
"#;

const INTAKE_SYSTEM: &str = r#"{context}

Patient details:
Name: {name}
Age: {age}
Gender: {gender}
Location: {location}
Date of visit: {date}
Habits: {habits}

Ask exactly one follow-up question at a time. Once the answers are enough to narrow it down, give the most likely causes and say clearly when the patient should see a doctor in person."#;

const INTAKE_CONTEXT: &str = "You are a careful medical intake assistant. You collect symptoms from the patient described below before offering any assessment. You never prescribe medication.";

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("The template needs patient metadata '{0}' but none was provided")]
    MissingMetadata(String),
    #[error("Unknown template placeholder '{0}'")]
    UnknownPlaceholder(String),
}

//=========================================================================================
// Payload Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The ordered, role-tagged messages handed to the inference service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub messages: Vec<PromptMessage>,
}

//=========================================================================================
// Templates
//=========================================================================================

/// How the conversation is packed into the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptEncoding {
    /// Everything rendered into one user message.
    Single,
    /// A system message, one message per prior turn, then the question.
    Messages,
}

impl FromStr for PromptEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(PromptEncoding::Single),
            "messages" => Ok(PromptEncoding::Messages),
            other => Err(format!("'{}' is not a prompt encoding (single|messages)", other)),
        }
    }
}

/// The built-in instruction sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateVariant {
    HistoryArchive,
    PatientIntake,
}

impl TemplateVariant {
    pub fn template(self) -> PromptTemplate {
        match self {
            TemplateVariant::HistoryArchive => PromptTemplate {
                single: ARCHIVE_INSTRUCTIONS.to_string(),
                system: ARCHIVE_SYSTEM.to_string(),
                context: ARCHIVE_CONTEXT.to_string(),
            },
            TemplateVariant::PatientIntake => PromptTemplate {
                single: INTAKE_INSTRUCTIONS.to_string(),
                system: INTAKE_SYSTEM.to_string(),
                context: INTAKE_CONTEXT.to_string(),
            },
        }
    }
}

impl FromStr for TemplateVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "history_archive" => Ok(TemplateVariant::HistoryArchive),
            "patient_intake" => Ok(TemplateVariant::PatientIntake),
            other => Err(format!(
                "'{}' is not a template variant (history_archive|patient_intake)",
                other
            )),
        }
    }
}

/// Instruction text with `{placeholder}` slots.
///
/// `single` may use `{context}`, `{chat_history}`, `{question}` and any patient
/// field. `system` is the leading message in `Messages` mode; there the history
/// and question travel as their own messages, so those two placeholders render empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub single: String,
    pub system: String,
    pub context: String,
}

//=========================================================================================
// Assembler
//=========================================================================================

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: PromptTemplate,
    encoding: PromptEncoding,
}

/// Values available to one rendering pass.
struct Slots<'a> {
    context: &'a str,
    chat_history: Option<&'a str>,
    question: Option<&'a str>,
    patient: Option<&'a PatientInfo>,
}

impl PromptAssembler {
    pub fn new(template: PromptTemplate, encoding: PromptEncoding) -> Self {
        Self { template, encoding }
    }

    pub fn encoding(&self) -> PromptEncoding {
        self.encoding
    }

    /// Builds the payload for `question` given the turns recorded before it.
    /// Suggestion turns in `history` are skipped.
    pub fn assemble(
        &self,
        patient: Option<&PatientInfo>,
        history: &[Turn],
        question: &str,
    ) -> Result<PromptPayload, PromptError> {
        match self.encoding {
            PromptEncoding::Single => {
                let chat_history = format_chat_history(history);
                let slots = Slots {
                    context: &self.template.context,
                    chat_history: Some(&chat_history),
                    question: Some(question),
                    patient,
                };
                let content = render(&self.template.single, &slots)?;
                Ok(PromptPayload {
                    messages: vec![PromptMessage::new(MessageRole::User, content)],
                })
            }
            PromptEncoding::Messages => {
                let slots = Slots {
                    context: &self.template.context,
                    chat_history: None,
                    question: None,
                    patient,
                };
                let mut messages = vec![PromptMessage::new(
                    MessageRole::System,
                    render(&self.template.system, &slots)?,
                )];
                for turn in context_turns(history) {
                    let role = match turn.speaker {
                        Speaker::Assistant => MessageRole::Assistant,
                        _ => MessageRole::User,
                    };
                    messages.push(PromptMessage::new(role, turn.content.as_str()));
                }
                messages.push(PromptMessage::new(MessageRole::User, question));
                Ok(PromptPayload { messages })
            }
        }
    }
}

/// The turns that count as conversation, in order.
pub fn context_turns(turns: &[Turn]) -> impl Iterator<Item = &Turn> {
    turns.iter().filter(|turn| turn.is_conversational())
}

/// Serializes prior turns as `User:`/`Assistant:` lines.
pub fn format_chat_history(turns: &[Turn]) -> String {
    context_turns(turns)
        .map(|turn| match turn.speaker {
            Speaker::Assistant => format!("Assistant: {}", turn.content),
            _ => format!("User: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render(template: &str, slots: &Slots<'_>) -> Result<String, PromptError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&resolve(key.as_str(), slots)?);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);

    Ok(rendered)
}

fn resolve(key: &str, slots: &Slots<'_>) -> Result<String, PromptError> {
    match key {
        "context" => Ok(slots.context.to_string()),
        "chat_history" => Ok(slots.chat_history.unwrap_or_default().to_string()),
        "question" => Ok(slots.question.unwrap_or_default().to_string()),
        _ if PatientInfo::FIELDS.contains(&key) => slots
            .patient
            .and_then(|patient| patient.field(key))
            .ok_or_else(|| PromptError::MissingMetadata(key.to_string())),
        _ => Err(PromptError::UnknownPlaceholder(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn patient() -> PatientInfo {
        PatientInfo {
            name: "A".to_string(),
            age: 30,
            gender: "Male".to_string(),
            location: "X".to_string(),
            date: "2024-01-01".to_string(),
            habits: None,
            submitted_at: Utc::now(),
        }
    }

    fn exchange() -> Vec<Turn> {
        vec![
            Turn::new(Speaker::User, "When was the war?"),
            Turn::new(Speaker::Suggestion, "Add more books"),
            Turn::new(Speaker::Assistant, "In 1971."),
        ]
    }

    #[test]
    fn intake_prompt_interpolates_patient_metadata() {
        let assembler = PromptAssembler::new(
            TemplateVariant::PatientIntake.template(),
            PromptEncoding::Single,
        );
        let payload = assembler
            .assemble(Some(&patient()), &[], "I have a headache")
            .unwrap();

        assert_eq!(payload.messages.len(), 1);
        let content = &payload.messages[0].content;
        assert!(content.contains("Name: A\n"));
        assert!(content.contains("Age: 30\n"));
        assert!(content.contains("Gender: Male\n"));
        assert!(content.contains("Location: X\n"));
        assert!(content.contains("Date of visit: 2024-01-01\n"));
        assert!(content.contains("Patient: I have a headache\n"));
    }

    #[test]
    fn missing_patient_metadata_fails_assembly() {
        let assembler = PromptAssembler::new(
            TemplateVariant::PatientIntake.template(),
            PromptEncoding::Messages,
        );
        let err = assembler.assemble(None, &[], "hello").unwrap_err();
        assert_eq!(err, PromptError::MissingMetadata("name".to_string()));
    }

    #[test]
    fn single_mode_serializes_history_without_suggestions() {
        let assembler = PromptAssembler::new(
            TemplateVariant::HistoryArchive.template(),
            PromptEncoding::Single,
        );
        let payload = assembler.assemble(None, &exchange(), "Who led it?").unwrap();
        let content = &payload.messages[0].content;

        assert!(content.contains("Chat History: User: When was the war?\nAssistant: In 1971.\n"));
        assert!(content.contains("Question: Who led it?\n"));
        assert!(!content.contains("Add more books"));
    }

    #[test]
    fn messages_mode_emits_system_history_and_question() {
        let assembler = PromptAssembler::new(
            TemplateVariant::HistoryArchive.template(),
            PromptEncoding::Messages,
        );
        let payload = assembler.assemble(None, &exchange(), "Who led it?").unwrap();
        let roles: Vec<MessageRole> = payload.messages.iter().map(|m| m.role).collect();

        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert!(payload.messages[0].content.contains("Anthony Mascarenhas"));
        assert_eq!(payload.messages[3].content, "Who led it?");
    }

    #[test]
    fn rendering_is_deterministic() {
        let assembler = PromptAssembler::new(
            TemplateVariant::PatientIntake.template(),
            PromptEncoding::Single,
        );
        let history = exchange();
        let first = assembler.assemble(Some(&patient()), &history, "still hurts").unwrap();
        let second = assembler.assemble(Some(&patient()), &history, "still hurts").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let assembler = PromptAssembler::new(
            TemplateVariant::HistoryArchive.template(),
            PromptEncoding::Single,
        );
        let payload = assembler.assemble(None, &[], "what is {name}?").unwrap();
        assert!(payload.messages[0].content.contains("Question: what is {name}?"));
    }

    #[test]
    fn system_template_leaves_history_and_question_empty() {
        let template = PromptTemplate {
            single: "{question}".to_string(),
            system: "Answer [{question}] after [{chat_history}]".to_string(),
            context: String::new(),
        };
        let assembler = PromptAssembler::new(template, PromptEncoding::Messages);
        let payload = assembler.assemble(None, &exchange(), "hi").unwrap();
        assert_eq!(payload.messages[0].content, "Answer [] after []");
        assert_eq!(payload.messages.last().unwrap().content, "hi");
    }

    #[test]
    fn unknown_placeholders_are_rejected() {
        let template = PromptTemplate {
            single: "{question} in {language}".to_string(),
            system: String::new(),
            context: String::new(),
        };
        let assembler = PromptAssembler::new(template, PromptEncoding::Single);
        let err = assembler.assemble(None, &[], "hi").unwrap_err();
        assert_eq!(err, PromptError::UnknownPlaceholder("language".to_string()));
    }

    #[test]
    fn parses_configuration_names() {
        assert_eq!("Messages".parse::<PromptEncoding>(), Ok(PromptEncoding::Messages));
        assert_eq!(
            "patient_intake".parse::<TemplateVariant>(),
            Ok(TemplateVariant::PatientIntake)
        );
        assert!("json".parse::<PromptEncoding>().is_err());
    }
}
