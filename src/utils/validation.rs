//! Input and ownership rules shared by the handlers.
//!
//! Every function is pure: it either accepts the input or returns the
//! `ServiceError` the handler should answer with. Field and ownership rules
//! both produce `ValidationError` (400). Free text is measured after
//! trimming, which is also the form the handlers store.

use chrono::{DateTime, Utc};
use validator::ValidateEmail;

use crate::config::ValidationRules;
use crate::storage::{allowed_file, ALLOWED_FILE_EXTENSIONS};
use crate::utils::errors::ServiceError;

pub type Validation = Result<(), ServiceError>;

pub const MAX_ASSIGNEES: usize = 5;
pub const MAX_MESSAGE_FILES: usize = 10;

fn invalid(message: &str) -> Validation {
    Err(ServiceError::validation(message))
}

fn within(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.chars().count())
}

/// Length bound on text that is stored trimmed.
fn text_within(value: &str, min: usize, max: usize) -> bool {
    within(value.trim(), min, max)
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn validate_signup(
    name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
    rules: &ValidationRules,
) -> Validation {
    if blank(name) || blank(email) || password.is_empty() || confirm_password.is_empty() {
        return invalid("Fill up all empty fields");
    }
    if !within(name, 5, 20) || !within(email, 15, 40) || !within(password, 8, 20) {
        return invalid("Fill up fields with specified length");
    }
    if password != confirm_password {
        return invalid("Passwords do not match");
    }
    if !rules.name.is_match(name) {
        return invalid("Invalid Username");
    }
    if !email.validate_email() || !rules.email.is_match(email) {
        return invalid("Invalid Email");
    }
    if !rules.password.is_match(password) {
        return invalid("Invalid Password");
    }

    Ok(())
}

pub fn validate_login(email: &str, password: &str) -> Validation {
    if blank(email) || password.is_empty() {
        return invalid("Fill up all empty fields");
    }
    if !within(email, 15, 40) || !within(password, 8, 20) {
        return invalid("Fill up fields with specified length");
    }

    Ok(())
}

pub fn validate_title(title: &str) -> Validation {
    if blank(title) || !text_within(title, 15, 100) {
        return invalid("Name should be 15-100 characters");
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Validation {
    if blank(description) || !text_within(description, 50, 1000) {
        return invalid("Description should be 50-1000 characters");
    }
    Ok(())
}

/// A due date must fall on a later calendar day than `now`.
pub fn validate_due(due: DateTime<Utc>, now: DateTime<Utc>) -> Validation {
    if due.date_naive() <= now.date_naive() {
        return invalid("Due should not be earlier than now");
    }
    Ok(())
}

pub fn validate_assignees(assignees: &[i32]) -> Validation {
    if !(1..=MAX_ASSIGNEES).contains(&assignees.len()) {
        return invalid("Assignees should range from 1 to 5");
    }
    Ok(())
}

pub fn validate_task(
    title: &str,
    description: &str,
    due: DateTime<Utc>,
    assignees: &[i32],
    now: DateTime<Utc>,
) -> Validation {
    if blank(title) || blank(description) {
        return invalid("Name and description should not be empty");
    }
    validate_title(title)?;
    validate_description(description)?;
    validate_due(due, now)?;
    validate_assignees(assignees)
}

pub fn validate_subtask(
    description: &str,
    due: DateTime<Utc>,
    assignees: &[i32],
    now: DateTime<Utc>,
) -> Validation {
    validate_description(description)?;
    validate_due(due, now)?;
    validate_assignees(assignees)
}

pub fn validate_checklist(description: &str, assignees: &[i32]) -> Validation {
    validate_description(description)?;
    validate_assignees(assignees)
}

pub fn validate_comment(description: &str) -> Validation {
    if blank(description) || !text_within(description, 10, 500) {
        return invalid("Description should be 10-500 characters");
    }
    Ok(())
}

fn validate_files(file_names: &[&str]) -> Validation {
    if file_names.len() > MAX_MESSAGE_FILES {
        return invalid("Attach at most 10 files");
    }
    if file_names.iter().any(|name| !allowed_file(name, ALLOWED_FILE_EXTENSIONS)) {
        return invalid("The file type is not allowed");
    }
    Ok(())
}

pub fn validate_message(title: &str, description: &str, file_names: &[&str]) -> Validation {
    if blank(title) || blank(description) {
        return invalid("Name and description should not be empty");
    }
    if !text_within(title, 15, 100) {
        return invalid("Name should be 15-100 characters");
    }
    if !text_within(description, 50, 3000) {
        return invalid("Description should be 50-3000 characters");
    }
    validate_files(file_names)
}

pub fn validate_reply(description: &str, file_names: &[&str]) -> Validation {
    if blank(description) || !text_within(description, 10, 3000) {
        return invalid("Description should be 10-3000 characters");
    }
    validate_files(file_names)
}

pub fn validate_user_name(name: &str, rules: &ValidationRules) -> Validation {
    if blank(name) || !within(name, 5, 20) {
        return invalid("Username should be 5-20 characters");
    }
    if !rules.name.is_match(name) {
        return invalid("Invalid Username");
    }
    Ok(())
}

pub fn validate_user_role(role: &str) -> Validation {
    if blank(role) || !text_within(role, 5, 50) {
        return invalid("Role should be 5-50 characters");
    }
    Ok(())
}

/// Priority, status and type are free-form labels.
pub fn validate_label(field: &str, value: &str) -> Validation {
    if blank(value) || !text_within(value, 1, 30) {
        return Err(ServiceError::validation(format!("{} should be 1-30 characters", field)));
    }
    Ok(())
}

pub fn require_creator(user_id: i32, creator_id: i32, message: &str) -> Validation {
    if user_id != creator_id {
        return invalid(message);
    }
    Ok(())
}

pub fn require_assignee(user_id: i32, assignees: &[i32], message: &str) -> Validation {
    if !assignees.contains(&user_id) {
        return invalid(message);
    }
    Ok(())
}

pub fn require_creator_or_assignee(
    user_id: i32,
    creator_id: i32,
    assignees: &[i32],
    message: &str,
) -> Validation {
    if user_id != creator_id && !assignees.contains(&user_id) {
        return invalid(message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rules() -> ValidationRules {
        ValidationRules::with_defaults().unwrap()
    }

    fn message_of(result: Validation) -> String {
        match result {
            Err(ServiceError::ValidationError(msg)) => msg,
            other => panic!("unexpected result: {:?}", other),
        }
    }

    const TITLE: &str = "Prepare release notes";
    const DESCRIPTION: &str = "Collect every merged change since the last tag and summarise it.";

    #[test]
    fn signup_checks_run_in_order() {
        let r = rules();
        assert_eq!(
            message_of(validate_signup("", "jane.doe@example.com", "secret123", "secret123", &r)),
            "Fill up all empty fields"
        );
        assert_eq!(
            message_of(validate_signup("jan", "jane.doe@example.com", "secret123", "secret123", &r)),
            "Fill up fields with specified length"
        );
        assert_eq!(
            message_of(validate_signup("jane_doe", "jane.doe@example.com", "secret123", "secret124", &r)),
            "Passwords do not match"
        );
        assert_eq!(
            message_of(validate_signup("jane doe", "jane.doe@example.com", "secret123", "secret123", &r)),
            "Invalid Username"
        );
        assert_eq!(
            message_of(validate_signup("jane_doe", "jane.doe.example.com", "secret123", "secret123", &r)),
            "Invalid Email"
        );
        assert_eq!(
            message_of(validate_signup("jane_doe", "jane.doe@example.com", "secretpwd", "secretpwd", &r)),
            "Invalid Password"
        );
        assert!(validate_signup("jane_doe", "jane.doe@example.com", "secret123", "secret123", &r).is_ok());
    }

    #[test]
    fn login_requires_lengths() {
        assert_eq!(message_of(validate_login("", "secret123")), "Fill up all empty fields");
        assert_eq!(
            message_of(validate_login("a@b.io", "secret123")),
            "Fill up fields with specified length"
        );
        assert!(validate_login("jane.doe@example.com", "secret123").is_ok());
    }

    #[test]
    fn task_title_bounds() {
        assert!(validate_title(&"a".repeat(15)).is_ok());
        assert!(validate_title(&"a".repeat(100)).is_ok());
        assert!(validate_title(&"a".repeat(14)).is_err());
        assert!(validate_title(&"a".repeat(101)).is_err());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        // 15 two-byte characters
        assert!(validate_title(&"é".repeat(15)).is_ok());
    }

    #[test]
    fn due_must_be_after_today() {
        let now = Utc::now();
        assert!(validate_due(now + Duration::days(1), now).is_ok());
        assert_eq!(message_of(validate_due(now, now)), "Due should not be earlier than now");
        assert!(validate_due(now - Duration::days(3), now).is_err());
    }

    #[test]
    fn task_validation_order() {
        let now = Utc::now();
        let tomorrow = now + Duration::days(1);
        assert_eq!(
            message_of(validate_task("", DESCRIPTION, tomorrow, &[1], now)),
            "Name and description should not be empty"
        );
        assert_eq!(
            message_of(validate_task("Too short", DESCRIPTION, tomorrow, &[1], now)),
            "Name should be 15-100 characters"
        );
        assert_eq!(
            message_of(validate_task(TITLE, "Short description", tomorrow, &[1], now)),
            "Description should be 50-1000 characters"
        );
        assert_eq!(
            message_of(validate_task(TITLE, DESCRIPTION, tomorrow, &[], now)),
            "Assignees should range from 1 to 5"
        );
        assert_eq!(
            message_of(validate_task(TITLE, DESCRIPTION, tomorrow, &[1, 2, 3, 4, 5, 6], now)),
            "Assignees should range from 1 to 5"
        );
        assert!(validate_task(TITLE, DESCRIPTION, tomorrow, &[1, 2, 3, 4, 5], now).is_ok());
    }

    #[test]
    fn comment_bounds() {
        assert!(validate_comment("Looks good").is_ok());
        assert_eq!(message_of(validate_comment("Nice")), "Description should be 10-500 characters");
        assert!(validate_comment(&"x".repeat(501)).is_err());
    }

    #[test]
    fn message_rejects_disallowed_files() {
        assert!(validate_message(TITLE, DESCRIPTION, &["notes.pdf", "photo.JPG"]).is_ok());
        assert_eq!(
            message_of(validate_message(TITLE, DESCRIPTION, &["setup.exe"])),
            "The file type is not allowed"
        );
        assert_eq!(
            message_of(validate_message(TITLE, DESCRIPTION, &["README"])),
            "The file type is not allowed"
        );
        let many = vec!["a.txt"; MAX_MESSAGE_FILES + 1];
        assert_eq!(message_of(validate_message(TITLE, DESCRIPTION, &many)), "Attach at most 10 files");
    }

    #[test]
    fn message_description_allows_three_thousand_chars() {
        assert!(validate_message(TITLE, &"d".repeat(3000), &[]).is_ok());
        assert_eq!(
            message_of(validate_message(TITLE, &"d".repeat(3001), &[])),
            "Description should be 50-3000 characters"
        );
    }

    #[test]
    fn reply_bounds() {
        assert!(validate_reply("Thanks, will do", &[]).is_ok());
        assert!(validate_reply("ok", &[]).is_err());
    }

    #[test]
    fn user_name_and_role() {
        let r = rules();
        assert!(validate_user_name("jane_doe", &r).is_ok());
        assert_eq!(message_of(validate_user_name("jd", &r)), "Username should be 5-20 characters");
        assert_eq!(message_of(validate_user_name("jane doe", &r)), "Invalid Username");
        assert!(validate_user_role("Backend engineer").is_ok());
        assert_eq!(message_of(validate_user_role("dev")), "Role should be 5-50 characters");
    }

    #[test]
    fn labels_are_bounded() {
        assert!(validate_label("Priority", "High").is_ok());
        assert_eq!(message_of(validate_label("Status", "  ")), "Status should be 1-30 characters");
        assert!(validate_label("Type", &"t".repeat(31)).is_err());
    }

    #[test]
    fn ownership_rules_are_validation_errors() {
        assert!(require_creator(1, 1, "Only task creator can edit name").is_ok());
        let err = require_creator(2, 1, "Only task creator can edit name").unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        assert!(require_assignee(3, &[1, 3], "Only assignees can edit status").is_ok());
        assert!(require_assignee(2, &[1, 3], "Only assignees can edit status").is_err());

        let msg = "Only assignees and task creator can add subtask";
        assert!(require_creator_or_assignee(1, 1, &[], msg).is_ok());
        assert!(require_creator_or_assignee(3, 1, &[3], msg).is_ok());
        assert_eq!(message_of(require_creator_or_assignee(4, 1, &[3], msg)), msg);
    }

    #[test]
    fn padding_does_not_count_towards_minimum_length() {
        // 15 characters with the leading space, 14 once trimmed
        assert_eq!(message_of(validate_title(" Fix login bug!")), "Name should be 15-100 characters");
        assert!(validate_title("  Fix the login bug  ").is_ok());

        let padded = format!("  {}  ", "d".repeat(49));
        assert_eq!(
            message_of(validate_description(&padded)),
            "Description should be 50-1000 characters"
        );
        assert!(validate_comment("  Nice one  ").is_err());
        assert!(validate_reply(" Thank you ", &[]).is_err());
        assert!(validate_user_role("  dev  ").is_err());
        assert_eq!(
            message_of(validate_message(&format!(" {} ", "t".repeat(14)), DESCRIPTION, &[])),
            "Name should be 15-100 characters"
        );
    }
}
