use chrono::{Local, NaiveDate};

use super::{FieldError, Validate};
use crate::api::{
    RealTrainingInput, StudentCancellation, StudentInput, StudentSubscriptionInput,
    SubscriptionInput, TrainerInput, TrainingCancellation, TrainingStudentTemplateInput,
    TrainingTemplateInput, TrainingTypeInput,
};
use crate::record::RecordId;

#[derive(Default)]
struct Checks(Vec<FieldError>);

impl Checks {
    fn check(&mut self, ok: bool, field: &'static str, message: &str) -> &mut Self {
        if !ok {
            self.0.push(FieldError::new(field, message));
        }
        self
    }

    fn required(&mut self, field: &'static str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "Required")
    }

    fn reference(&mut self, field: &'static str, id: RecordId) -> &mut Self {
        self.check(id > 0, field, "Select a value")
    }

    fn phone(&mut self, field: &'static str, value: Option<&str>) -> &mut Self {
        let ok = value.map_or(true, |phone| {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            digits >= 7
                && phone
                    .chars()
                    .all(|c| c.is_ascii_digit() || " +-()".contains(c))
        });
        self.check(ok, field, "Invalid phone number")
    }

    fn not_negative(&mut self, field: &'static str, value: Option<f64>) -> &mut Self {
        let ok = value.map_or(true, |v| v.is_finite() && v >= 0.0);
        self.check(ok, field, "Must be zero or more")
    }

    fn finish(&mut self) -> Vec<FieldError> {
        std::mem::take(&mut self.0)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl Validate for TrainingTemplateInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .check((1..=7).contains(&self.day_number), "day_number", "Day must be 1 to 7")
            .reference("responsible_trainer_id", self.responsible_trainer_id)
            .reference("training_type_id", self.training_type_id)
            .finish()
    }
}

impl Validate for RealTrainingInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .reference("responsible_trainer_id", self.responsible_trainer_id)
            .reference("training_type_id", self.training_type_id)
            .finish()
    }
}

impl Validate for TrainingStudentTemplateInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .reference("training_template_id", self.training_template_id)
            .reference("student_id", self.student_id)
            .finish()
    }
}

impl Validate for StudentInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .required("first_name", &self.first_name)
            .required("last_name", &self.last_name)
            .phone("phone", self.phone.as_deref())
            .check(
                self.date_of_birth.map_or(true, |born| born <= today()),
                "date_of_birth",
                "Cannot be in the future",
            )
            .finish()
    }
}

impl Validate for StudentSubscriptionInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .reference("subscription_id", self.subscription_id)
            .finish()
    }
}

impl Validate for SubscriptionInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .required("name", &self.name)
            .not_negative("price", Some(self.price))
            .check(self.number_of_sessions > 0, "number_of_sessions", "At least one session")
            .check(self.validity_days > 0, "validity_days", "At least one day")
            .finish()
    }
}

impl Validate for TrainerInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .required("first_name", &self.first_name)
            .required("last_name", &self.last_name)
            .phone("phone", self.phone.as_deref())
            .check(
                self.email.as_deref().map_or(true, |email| {
                    email
                        .split_once('@')
                        .map_or(false, |(user, domain)| !user.is_empty() && domain.contains('.'))
                }),
                "email",
                "Invalid email",
            )
            .not_negative("salary", self.salary)
            .check(
                !self.is_fixed_salary || self.salary.is_some(),
                "salary",
                "Required for a fixed salary",
            )
            .finish()
    }
}

impl Validate for TrainingTypeInput {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default()
            .required("name", &self.name)
            .check(
                self.color.as_deref().map_or(true, |color| {
                    color.len() == 7
                        && color.starts_with('#')
                        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
                }),
                "color",
                "Expected #rrggbb",
            )
            .check(
                self.max_participants.map_or(true, |max| max > 0),
                "max_participants",
                "At least one participant",
            )
            .not_negative("price", self.price)
            .finish()
    }
}

impl Validate for StudentCancellation {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default().required("reason", &self.reason).finish()
    }
}

impl Validate for TrainingCancellation {
    fn validate(&self) -> Vec<FieldError> {
        Checks::default().required("reason", &self.reason).finish()
    }
}
