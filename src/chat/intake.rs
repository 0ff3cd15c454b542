use serde_json::Value;
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::IntakeError;
use crate::clock;
use crate::coach::CoachProfile;
use crate::images::NormalizedImage;
use crate::llm::{
    strip_code_fences, FieldKind, GenerateRequest, GenerationClient, Part, ResponseSchema, Role,
    Turn,
};
use crate::meals::dto::{MealLog, Nutrition};
use crate::profile::dto::UserProfile;

#[derive(Debug, Clone, Copy)]
pub struct IntakeInput<'a> {
    pub text: Option<&'a str>,
    pub image: Option<&'a NormalizedImage>,
    pub profile: &'a UserProfile,
    /// Tail of the sanitized transcript, oldest first.
    pub recent: &'a [Turn],
    pub now: OffsetDateTime,
    /// Oldest day, counted back from today, a meal may be filed under.
    pub backdate_window_days: i64,
}

/// The classifier's verdict for one turn. Nutrition is all zero when the
/// turn is not a food report.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeDecision {
    pub is_food_related: bool,
    pub feedback: String,
    pub target_date: Date,
    pub nutrition: Nutrition,
    pub confirmation_message: Option<String>,
}

impl IntakeDecision {
    /// The meal to propose, stamped on the target date at the current
    /// wall-clock time.
    pub fn proposal(&self, now: OffsetDateTime, image_ref: Option<String>) -> Option<MealLog> {
        if !self.is_food_related {
            return None;
        }
        let at = clock::on_date_at_time_of(self.target_date, now);
        Some(MealLog {
            id: Uuid::new_v4(),
            timestamp: clock::epoch_ms(at),
            name: self.nutrition.name.clone(),
            calories: self.nutrition.calories,
            protein: self.nutrition.protein,
            fat: self.nutrition.fat,
            carbs: self.nutrition.carbs,
            image_ref,
            confirmation_message: self.confirmation_message.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionFields {
    pub is_food_related: bool,
    pub feedback: String,
    pub target_date: Option<String>,
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub confirmation_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    Ok(DecisionFields),
    Malformed(String),
}

fn decision_schema() -> ResponseSchema {
    ResponseSchema::default()
        .required("is_food_related", FieldKind::Boolean)
        .required("feedback", FieldKind::String)
        .required("target_date", FieldKind::String)
        .required("food_name", FieldKind::String)
        .required("calories", FieldKind::Number)
        .required("protein", FieldKind::Number)
        .required("fat", FieldKind::Number)
        .required("carbs", FieldKind::Number)
        .optional("confirmation_message", FieldKind::String)
}

fn non_empty_str<'v>(v: &'v Value, key: &str) -> Option<&'v str> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Numbers may arrive as JSON numbers or numeric strings; anything else
/// counts as zero.
fn number(v: &Value, key: &str) -> f64 {
    match v.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn boolean(v: &Value, key: &str) -> Option<bool> {
    match v.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Validates the model's JSON field by field. `is_food_related` and
/// `feedback` are always required, `food_name` only for food reports.
pub fn parse_decision(raw: &str) -> ParseResult {
    let v: Value = match serde_json::from_str(strip_code_fences(raw)) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => return ParseResult::Malformed("response is not an object".into()),
        Err(e) => return ParseResult::Malformed(format!("invalid json: {e}")),
    };
    let Some(is_food_related) = boolean(&v, "is_food_related") else {
        return ParseResult::Malformed("missing field `is_food_related`".into());
    };
    let Some(feedback) = non_empty_str(&v, "feedback") else {
        return ParseResult::Malformed("missing field `feedback`".into());
    };
    let food_name = non_empty_str(&v, "food_name").unwrap_or_default();
    if is_food_related && food_name.is_empty() {
        return ParseResult::Malformed("missing field `food_name`".into());
    }

    ParseResult::Ok(DecisionFields {
        is_food_related,
        feedback: feedback.to_string(),
        target_date: non_empty_str(&v, "target_date").map(str::to_string),
        food_name: food_name.to_string(),
        calories: number(&v, "calories"),
        protein: number(&v, "protein"),
        fat: number(&v, "fat"),
        carbs: number(&v, "carbs"),
        confirmation_message: non_empty_str(&v, "confirmation_message").map(str::to_string),
    })
}

/// Parses the model's date; unparseable, future, or older-than-window
/// dates fall back to `today`.
pub fn resolve_target_date(raw: Option<&str>, today: Date, window_days: i64) -> Date {
    let Some(date) = raw.and_then(clock::parse_ymd) else {
        return today;
    };
    let earliest = today - Duration::days(window_days.max(0));
    if date > today || date < earliest {
        warn!(%date, %today, "target date outside accepted window; using today");
        return today;
    }
    date
}

pub fn into_decision(fields: DecisionFields, today: Date, window_days: i64) -> IntakeDecision {
    let target_date = resolve_target_date(fields.target_date.as_deref(), today, window_days);
    if !fields.is_food_related {
        return IntakeDecision {
            is_food_related: false,
            feedback: fields.feedback,
            target_date,
            nutrition: Nutrition::normalized("", 0.0, 0.0, 0.0, 0.0),
            confirmation_message: None,
        };
    }
    let nutrition = Nutrition::normalized(
        &fields.food_name,
        fields.calories,
        fields.protein,
        fields.fat,
        fields.carbs,
    );
    let confirmation_message = fields
        .confirmation_message
        .or_else(|| Some(format!("Logged {} ({} kcal).", nutrition.name, nutrition.calories)));
    IntakeDecision {
        is_food_related: true,
        feedback: fields.feedback,
        target_date,
        nutrition,
        confirmation_message,
    }
}

fn system_instruction(coach: &CoachProfile, profile: &UserProfile, today: Date) -> String {
    format!(
        "You are {name}, the user's nutrition coach in a calorie tracking app.\n\
         Personality: {personality}\n\
         Tone: {tone}\n\n\
         The user is {user}, {age} years old, who wants to {goal}. \
         Their daily target is {target} kcal.\n\
         Today is {today} ({weekday}).\n\n\
         Decide whether the user's latest message reports something they ate or drank, \
         and answer with JSON only.\n\
         - is_food_related: true for any mention of a concrete food or drink, even a \
           single word, or any statement that they ate or drank. Greetings, requests for \
           encouragement and questions about their progress or reports are false.\n\
         - When false, set food_name to \"\" and calories, protein, fat and carbs to 0.\n\
         - When a photo is attached, estimate the portion actually visible (plate size, \
           how much is left) and base the numbers on that portion, not on a typical \
           serving. A caption is extra context and does not override the photo.\n\
         - food_name: a short display name for the meal.\n\
         - calories in kcal; protein, fat and carbs in grams.\n\
         - target_date: the day it was eaten as YYYY-MM-DD. Resolve words like \
           \"yesterday\" against today. Use today when unsure.\n\
         - feedback: one to three sentences in your own voice about this meal, \
           framed around the user's goal. For non-food messages, reply naturally.\n\
         - confirmation_message: one short line shown after the user saves the meal.\n\
         Write feedback and confirmation_message in the language the user writes in.",
        name = coach.name,
        personality = coach.personality,
        tone = coach.tone,
        user = profile.name,
        age = profile.age,
        goal = profile.goal.describe(),
        target = profile.target_calories,
        today = clock::format_ymd(today),
        weekday = today.weekday(),
    )
}

fn render_recent(recent: &[Turn], coach_name: &str) -> Option<String> {
    if recent.is_empty() {
        return None;
    }
    let lines: Vec<String> = recent
        .iter()
        .map(|t| match t.role {
            Role::User => format!("User: {}", t.text),
            Role::Model => format!("{coach_name}: {}", t.text),
        })
        .collect();
    Some(format!("Recent conversation:\n{}", lines.join("\n")))
}

pub(crate) fn build_request(input: &IntakeInput<'_>) -> GenerateRequest {
    let coach = input.profile.active_coach();
    let mut parts = Vec::new();
    if let Some(context) = render_recent(input.recent, &coach.name) {
        parts.push(Part::Text(context));
    }
    if let Some(img) = input.image {
        parts.push(Part::InlineImage {
            mime_type: img.mime_type.clone(),
            data: img.base64.clone(),
        });
    }
    let text = input.text.map(str::trim).filter(|t| !t.is_empty());
    parts.push(Part::Text(match (text, input.image.is_some()) {
        (Some(t), true) => format!("Photo caption: {t}"),
        (Some(t), false) => format!("User message: {t}"),
        (None, _) => "The user sent this photo without a caption.".to_string(),
    }));

    GenerateRequest {
        system_instruction: system_instruction(&coach, input.profile, input.now.date()),
        history: Vec::new(),
        parts,
        schema: Some(decision_schema()),
    }
}

#[instrument(skip_all, fields(has_image = input.image.is_some()))]
pub async fn classify(
    client: &dyn GenerationClient,
    input: &IntakeInput<'_>,
) -> Result<IntakeDecision, IntakeError> {
    let request = build_request(input);
    let response = client.generate(&request).await.map_err(|e| {
        warn!(error = %e, "intake generation failed");
        IntakeError::Transport(e)
    })?;
    let raw = response.text.unwrap_or_default();
    debug!(%raw, "intake raw response");

    let fields = match parse_decision(&raw) {
        ParseResult::Ok(f) => f,
        ParseResult::Malformed(reason) => {
            warn!(%reason, "intake response malformed");
            return Err(IntakeError::Parse(reason));
        }
    };
    let decision = into_decision(fields, input.now.date(), input.backdate_window_days);
    info!(
        is_food_related = decision.is_food_related,
        calories = decision.nutrition.calories,
        target_date = %decision.target_date,
        "intake classified"
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fake::ScriptedClient;
    use crate::profile::dto::sample_profile;
    use time::macros::{date, datetime};

    const NOW: OffsetDateTime = datetime!(2026-10-19 12:34:56 UTC);

    fn input<'a>(text: &'a str, profile: &'a UserProfile, recent: &'a [Turn]) -> IntakeInput<'a> {
        IntakeInput {
            text: Some(text),
            image: None,
            profile,
            recent,
            now: NOW,
            backdate_window_days: 30,
        }
    }

    #[test]
    fn parse_accepts_fenced_food_report() {
        let raw = "```json\n{\"is_food_related\":true,\"feedback\":\"Nice!\",\"target_date\":\"2026-10-18\",\
                   \"food_name\":\"Ramen\",\"calories\":\"650.6\",\"protein\":24.44,\"fat\":-3,\"carbs\":80}\n```";
        let ParseResult::Ok(f) = parse_decision(raw) else {
            panic!("expected ok");
        };
        assert!(f.is_food_related);
        assert_eq!(f.calories, 650.6);
        let d = into_decision(f, date!(2026 - 10 - 19), 30);
        assert_eq!(d.nutrition.calories, 651);
        assert_eq!(d.nutrition.protein, 24.4);
        assert_eq!(d.nutrition.fat, 0.0);
        assert_eq!(d.target_date, date!(2026 - 10 - 18));
        assert_eq!(d.confirmation_message.as_deref(), Some("Logged Ramen (651 kcal)."));
    }

    #[test]
    fn parse_flags_each_missing_required_field() {
        let cases = [
            ("not json", "invalid json"),
            ("[1,2]", "not an object"),
            (r#"{"feedback":"hi"}"#, "is_food_related"),
            (r#"{"is_food_related":false}"#, "feedback"),
            (r#"{"is_food_related":true,"feedback":"ok","calories":100}"#, "food_name"),
        ];
        for (raw, needle) in cases {
            match parse_decision(raw) {
                ParseResult::Malformed(reason) => assert!(reason.contains(needle), "{raw}: {reason}"),
                ParseResult::Ok(_) => panic!("{raw} should be malformed"),
            }
        }
    }

    #[test]
    fn non_food_decision_has_zero_nutrition() {
        let raw = r#"{"is_food_related":false,"feedback":"Glad to hear it!","food_name":"x","calories":300}"#;
        let ParseResult::Ok(f) = parse_decision(raw) else {
            panic!("expected ok");
        };
        let d = into_decision(f, date!(2026 - 10 - 19), 30);
        assert_eq!(d.nutrition, Nutrition::normalized("", 0.0, 0.0, 0.0, 0.0));
        assert!(d.proposal(NOW, None).is_none());
    }

    #[test]
    fn target_date_falls_back_to_today() {
        let today = date!(2026 - 10 - 19);
        assert_eq!(resolve_target_date(None, today, 30), today);
        assert_eq!(resolve_target_date(Some("last tuesday"), today, 30), today);
        assert_eq!(resolve_target_date(Some("2026-10-20"), today, 30), today);
        assert_eq!(resolve_target_date(Some("2025-01-01"), today, 30), today);
        assert_eq!(resolve_target_date(Some("2026-09-19"), today, 30), date!(2026 - 09 - 19));
    }

    #[test]
    fn backdated_proposal_uses_current_time_of_day() {
        let raw = r#"{"is_food_related":true,"feedback":"ok","target_date":"2026-10-18","food_name":"Curry","calories":700,"protein":20,"fat":25,"carbs":90}"#;
        let ParseResult::Ok(f) = parse_decision(raw) else {
            panic!("expected ok");
        };
        let meal = into_decision(f, NOW.date(), 30)
            .proposal(NOW, Some("meals/u/p.jpg".into()))
            .unwrap();
        let expected = clock::epoch_ms(datetime!(2026-10-18 12:34:56 UTC));
        assert_eq!(meal.timestamp, expected);
        assert_eq!(meal.image_ref.as_deref(), Some("meals/u/p.jpg"));
    }

    #[tokio::test]
    async fn single_food_word_is_a_food_report() {
        let client = ScriptedClient::new().reply(
            r#"{"is_food_related":true,"feedback":"A banana is a great snack!","target_date":"2026-10-19",
                "food_name":"バナナ","calories":93,"protein":1.1,"fat":0.2,"carbs":22.5,
                "confirmation_message":"バナナを記録しました"}"#,
        );
        let profile = sample_profile();
        let d = classify(&client, &input("バナナ", &profile, &[])).await.unwrap();
        assert!(d.is_food_related);
        assert!(d.nutrition.calories > 0);
        assert_eq!(d.target_date, NOW.date());

        let req = client.request(0);
        assert!(req.schema.is_some());
        assert!(req.history.is_empty());
        assert!(matches!(req.parts.last(), Some(Part::Text(t)) if t.contains("バナナ")));
        assert!(req.system_instruction.contains("2026-10-19"));
        assert!(req.system_instruction.contains(&profile.target_calories.to_string()));
    }

    #[tokio::test]
    async fn conversational_message_is_not_food() {
        let client = ScriptedClient::new().reply(
            r#"{"is_food_related":false,"feedback":"Love that energy!","target_date":"","food_name":"",
                "calories":0,"protein":0,"fat":0,"carbs":0}"#,
        );
        let profile = sample_profile();
        let d = classify(&client, &input("今日は調子いいよ", &profile, &[])).await.unwrap();
        assert!(!d.is_food_related);
        assert_eq!(d.nutrition.calories, 0);
        assert_eq!(d.nutrition.protein + d.nutrition.fat + d.nutrition.carbs, 0.0);
    }

    #[tokio::test]
    async fn parse_and_transport_failures_are_distinct() {
        let profile = sample_profile();
        let bad = ScriptedClient::new().reply("sorry, I can't do JSON today");
        let err = classify(&bad, &input("rice", &profile, &[])).await.unwrap_err();
        assert!(matches!(err, IntakeError::Parse(_)));

        let down = ScriptedClient::new().fail();
        let err2 = classify(&down, &input("rice", &profile, &[])).await.unwrap_err();
        assert!(matches!(err2, IntakeError::Transport(_)));
        assert_ne!(err.reply_text(), err2.reply_text());

        let empty = ScriptedClient::new().empty_reply();
        let err3 = classify(&empty, &input("rice", &profile, &[])).await.unwrap_err();
        assert!(matches!(err3, IntakeError::Parse(_)));
    }

    #[test]
    fn request_carries_context_and_image_before_caption() {
        let profile = sample_profile();
        let recent = vec![
            Turn { role: Role::User, text: "I had pasta".into() },
            Turn { role: Role::Model, text: "Yum!".into() },
        ];
        let img = NormalizedImage {
            mime_type: "image/jpeg".into(),
            base64: "/9j/AA".into(),
            width: 10,
            height: 10,
        };
        let mut inp = input("the same again", &profile, &recent);
        inp.image = Some(&img);
        let req = build_request(&inp);
        assert_eq!(req.parts.len(), 3);
        assert!(matches!(&req.parts[0], Part::Text(t) if t.contains("User: I had pasta")));
        assert!(matches!(&req.parts[1], Part::InlineImage { mime_type, .. } if mime_type == "image/jpeg"));
        assert!(matches!(&req.parts[2], Part::Text(t) if t.starts_with("Photo caption:")));
    }

    #[test]
    fn image_without_caption_is_described() {
        let profile = sample_profile();
        let img = NormalizedImage {
            mime_type: "image/jpeg".into(),
            base64: "/9j/AA".into(),
            width: 1,
            height: 1,
        };
        let inp = IntakeInput {
            text: None,
            image: Some(&img),
            profile: &profile,
            recent: &[],
            now: NOW,
            backdate_window_days: 30,
        };
        let req = build_request(&inp);
        assert_eq!(req.parts.len(), 2);
        assert!(matches!(&req.parts[1], Part::Text(t) if t.contains("without a caption")));
    }
}
