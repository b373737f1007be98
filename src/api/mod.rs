//! Backend endpoints: record types, query descriptors and write operations.
//!
//! Each resource module pairs the serde DTOs of one backend collection with
//! its `Query` types and an accessor that `ApiClient` hands out.

pub mod real_trainings;
pub mod resource;
pub mod students;
pub mod subscriptions;
pub mod trainers;
pub mod training_templates;
pub mod training_types;

pub use real_trainings::{
    AttendanceStatus, DateRange, GetRealTraining, ListRealTrainingStudents, ListRealTrainings,
    RealTraining, RealTrainingInput, RealTrainingStudent, RealTrainingStudentInput,
    RealTrainings, StudentCancellation, TrainingCancellation,
};
pub use resource::{ById, Get, List, PageArgs, Paged, Resource, Resources};
pub use students::{
    ListStudentSubscriptions, Student, StudentInput, StudentSubscription,
    StudentSubscriptionInput, Students,
};
pub use subscriptions::{Subscription, SubscriptionInput};
pub use trainers::{Trainer, TrainerInput};
pub use training_templates::{
    GetTrainingTemplate, ListTrainingTemplates, StudentTemplates, TemplateFilter,
    TrainingStudentTemplate, TrainingStudentTemplateInput, TrainingTemplate,
    TrainingTemplateInput, TrainingTemplates,
};
pub use training_types::{TrainingType, TrainingTypeInput};

use crate::cache::CacheStore;
use crate::client::ApiClient;
use crate::query::QueryRegistry;
use crate::transport::Transport;

/// Every backend query family.
pub fn registry() -> QueryRegistry {
    QueryRegistry::new()
        .register::<ListTrainingTemplates>()
        .register::<GetTrainingTemplate>()
        .register::<ListRealTrainings>()
        .register::<GetRealTraining>()
        .register::<ListRealTrainingStudents>()
        .register::<List<Student>>()
        .register::<Get<Student>>()
        .register::<ListStudentSubscriptions>()
        .register::<List<Subscription>>()
        .register::<Get<Subscription>>()
        .register::<List<Trainer>>()
        .register::<Get<Trainer>>()
        .register::<List<TrainingType>>()
        .register::<Get<TrainingType>>()
}

impl<T: Transport, S: CacheStore> ApiClient<T, S> {
    pub fn training_templates(&self) -> TrainingTemplates<'_, T, S> {
        TrainingTemplates::new(self)
    }

    pub fn student_templates(&self) -> StudentTemplates<'_, T, S> {
        StudentTemplates::new(self)
    }

    pub fn real_trainings(&self) -> RealTrainings<'_, T, S> {
        RealTrainings::new(self)
    }

    pub fn students(&self) -> Students<'_, T, S> {
        Students::new(self)
    }

    pub fn subscriptions(&self) -> Resources<'_, Subscription, T, S> {
        self.resources()
    }

    pub fn trainers(&self) -> Resources<'_, Trainer, T, S> {
        self.resources()
    }

    pub fn training_types(&self) -> Resources<'_, TrainingType, T, S> {
        self.resources()
    }

    /// CRUD accessor for any resource.
    pub fn resources<R: Resource>(&self) -> Resources<'_, R, T, S> {
        Resources::new(self)
    }
}
