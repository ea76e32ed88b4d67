//! Runs the backend steps behind each intent.
//!
//! Every dispatching intent is one row in `ROUTES`: an ordered list of steps
//! and the template that assembles the final payload. A step either continues
//! or ends the route early with a result (failure, already-exists or
//! ambiguous); nothing after that step runs. Lookups that turn a human-facing
//! value into an internal id are cached on the session for later turns.

use std::collections::BTreeMap;
use std::sync::Arc;

use examdesk_core::domain::{
    AmbiguityReason, Candidate, Exam, ExamAttempt, ExamStatistics, Intent, OperationPayload,
    OperationResult, ScheduleConfirmation, ScheduledExam, SlotField, Slots, Student,
    SystemStatus,
};
use examdesk_core::errors::DialogueError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::matching::{is_hex_id, match_names, parse_ordinal};
use crate::tools::{
    OperationParams, OperationRegistry, CODE_NOT_FOUND, CODE_STUDENT_ALREADY_EXISTS,
    CODE_STUDENT_ALREADY_SCHEDULED, OP_CREATE_STUDENT, OP_GET_EXAM_ATTEMPT,
    OP_GET_EXAM_STATISTICS, OP_GET_INSTRUCTOR_ID, OP_LIST_EXAMS, OP_LIST_SCHEDULED_EXAMS,
    OP_LIST_STUDENTS, OP_SCHEDULE_EXAM, OP_SEARCH_STUDENT, PARAM_EXAM_ID, PARAM_EXAM_NAME,
    PARAM_FIRST_NAME, PARAM_INSTRUCTOR_ID, PARAM_LAST_NAME, PARAM_PASSWORD, PARAM_STUDENT_ID,
    PARAM_USER_EXAM_ID, PARAM_USER_ID,
};

pub const CACHE_INSTRUCTOR_ID: &str = "instructor_id";
const EXAM_CACHE_PREFIX: &str = "exam:";
const STUDENT_CACHE_PREFIX: &str = "student:";
const STUDENT_NAME_CACHE_PREFIX: &str = "student_name:";
const CODE_DECODE_ERROR: &str = "DECODE_ERROR";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    ResolveInstructor,
    CountExams,
    ListExams,
    ListStudents,
    CreateStudent,
    ResolveExam,
    ResolveStudent,
    CheckExistingSchedule,
    ScheduleExam,
    ListScheduled,
    SelectScheduledExam,
    FetchAttempt,
    FetchStatistics,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveInstructor => "resolve_instructor",
            Self::CountExams => "count_exams",
            Self::ListExams => "list_exams",
            Self::ListStudents => "list_students",
            Self::CreateStudent => "create_student",
            Self::ResolveExam => "resolve_exam",
            Self::ResolveStudent => "resolve_student",
            Self::CheckExistingSchedule => "check_existing_schedule",
            Self::ScheduleExam => "schedule_exam",
            Self::ListScheduled => "list_scheduled",
            Self::SelectScheduledExam => "select_scheduled_exam",
            Self::FetchAttempt => "fetch_attempt",
            Self::FetchStatistics => "fetch_statistics",
        }
    }

    /// What the step was doing, phrased for the user.
    fn activity(&self) -> &'static str {
        match self {
            Self::ResolveInstructor => "connect to ExamBuilder",
            Self::CountExams | Self::ListExams | Self::ResolveExam => "load the exam list",
            Self::ListStudents => "load the student list",
            Self::CreateStudent => "create the student account",
            Self::ResolveStudent => "look up the student",
            Self::CheckExistingSchedule | Self::ListScheduled | Self::SelectScheduledExam => {
                "load the scheduled exams"
            }
            Self::ScheduleExam => "schedule the exam",
            Self::FetchAttempt => "load the exam attempt",
            Self::FetchStatistics => "load the exam statistics",
        }
    }

    fn hint(&self) -> &'static str {
        match self {
            Self::ResolveInstructor => "Check the ExamBuilder API credentials, then try again.",
            Self::ResolveExam => "Try 'show me available exams' first.",
            Self::ResolveStudent => "Try 'list students' to check the Student ID.",
            Self::FetchAttempt | Self::FetchStatistics => {
                "Say 'show scheduled exams for <email>' to find the user exam ID."
            }
            _ => "Please try again in a moment.",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Template {
    Status,
    ExamCatalog,
    StudentRoster,
    StudentCreated,
    ExamScheduled,
    ScheduledExams,
    ExamAttempt,
    ExamStatistics,
}

#[derive(Clone, Copy, Debug)]
pub struct Route {
    pub intent: Intent,
    pub steps: &'static [Step],
    pub template: Template,
}

pub const ROUTES: &[Route] = &[
    Route {
        intent: Intent::Status,
        steps: &[Step::ResolveInstructor, Step::CountExams],
        template: Template::Status,
    },
    Route {
        intent: Intent::ListExams,
        steps: &[Step::ResolveInstructor, Step::ListExams],
        template: Template::ExamCatalog,
    },
    Route {
        intent: Intent::ListStudents,
        steps: &[Step::ResolveInstructor, Step::ListStudents],
        template: Template::StudentRoster,
    },
    Route {
        intent: Intent::CreateStudent,
        steps: &[Step::ResolveInstructor, Step::CreateStudent],
        template: Template::StudentCreated,
    },
    Route {
        intent: Intent::ScheduleExam,
        steps: &[
            Step::ResolveInstructor,
            Step::ResolveExam,
            Step::ResolveStudent,
            Step::CheckExistingSchedule,
            Step::ScheduleExam,
        ],
        template: Template::ExamScheduled,
    },
    Route {
        intent: Intent::ListScheduledExams,
        steps: &[Step::ResolveInstructor, Step::ResolveStudent, Step::ListScheduled],
        template: Template::ScheduledExams,
    },
    Route {
        intent: Intent::GetResults,
        steps: &[
            Step::ResolveInstructor,
            Step::ResolveStudent,
            Step::ListScheduled,
            Step::SelectScheduledExam,
            Step::FetchAttempt,
        ],
        template: Template::ExamAttempt,
    },
    Route {
        intent: Intent::GetExamAttempt,
        steps: &[Step::ResolveInstructor, Step::FetchAttempt],
        template: Template::ExamAttempt,
    },
    Route {
        intent: Intent::GetExamStatistics,
        steps: &[Step::ResolveInstructor, Step::ResolveStudent, Step::FetchStatistics],
        template: Template::ExamStatistics,
    },
];

pub fn route_for(intent: Intent) -> Option<&'static Route> {
    ROUTES.iter().find(|route| route.intent == intent)
}

/// Candidate the user picked, tagged with the step that offered it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub step: String,
    pub candidate: Candidate,
}

pub struct DispatchRequest<'a> {
    pub intent: Intent,
    pub slots: &'a Slots,
    /// Values supplied in this turn; optional list filters only read these.
    pub filters: &'a Slots,
    pub selection: Option<&'a Selection>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    pub result: OperationResult,
    /// Some step fetched a candidate list to resolve against.
    pub listed: bool,
}

/// Ending a route early. The result is not necessarily a failure.
type StepResult = Result<(), OperationResult>;

#[derive(Default)]
struct RouteData {
    instructor_id: String,
    exams: Option<Vec<Exam>>,
    students: Option<Vec<Student>>,
    exam: Option<Exam>,
    student: Option<Student>,
    created: Option<Student>,
    confirmation: Option<ScheduleConfirmation>,
    scheduled: Option<Vec<ScheduledExam>>,
    selected: Option<ScheduledExam>,
    attempt: Option<ExamAttempt>,
    statistics: Option<ExamStatistics>,
    listed: bool,
}

pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    fuzzy_max_distance: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<OperationRegistry>, fuzzy_max_distance: usize) -> Self {
        Self { registry, fuzzy_max_distance }
    }

    pub fn with_fuzzy_max_distance(mut self, fuzzy_max_distance: usize) -> Self {
        self.fuzzy_max_distance = fuzzy_max_distance;
        self
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub async fn dispatch(
        &self,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
    ) -> DispatchOutcome {
        let intent = request.intent;
        let Some(route) = route_for(intent) else {
            return DispatchOutcome {
                result: OperationResult::failure(
                    intent,
                    "route",
                    "That request doesn't need ExamBuilder.",
                    None,
                ),
                listed: false,
            };
        };

        let mut data = RouteData::default();
        for step in route.steps {
            info!(
                event_name = "agent.dispatch.step.started",
                intent = intent.as_str(),
                step = step.as_str(),
                "dispatch step started"
            );
            if let Err(result) = self.run_step(*step, request, cache, &mut data).await {
                return DispatchOutcome { result, listed: data.listed };
            }
        }

        let listed = data.listed;
        let result = match assemble(route.template, data) {
            Some(payload) => OperationResult::Success { intent, payload },
            None => OperationResult::failure(
                intent,
                "assemble",
                "Something went wrong while preparing the answer.",
                Some("Please try again.".to_string()),
            ),
        };
        DispatchOutcome { result, listed }
    }

    async fn run_step(
        &self,
        step: Step,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
        data: &mut RouteData,
    ) -> StepResult {
        match step {
            Step::ResolveInstructor => self.resolve_instructor(request, cache, data).await,
            Step::CountExams => {
                data.exams = Some(self.load_exams(step, request, cache, data, None).await?);
                Ok(())
            }
            Step::ListExams => {
                let filter = request.filters.get(SlotField::ExamName);
                data.exams = Some(self.load_exams(step, request, cache, data, filter).await?);
                Ok(())
            }
            Step::ListStudents => self.list_students(request, cache, data).await,
            Step::CreateStudent => self.create_student(request, cache, data).await,
            Step::ResolveExam => self.resolve_exam(request, cache, data).await,
            Step::ResolveStudent => self.resolve_student(request, cache, data).await,
            Step::CheckExistingSchedule => self.check_existing_schedule(request, data).await,
            Step::ScheduleExam => self.schedule_exam(request, data).await,
            Step::ListScheduled => self.list_scheduled(request, data).await,
            Step::SelectScheduledExam => self.select_scheduled_exam(request, data),
            Step::FetchAttempt => self.fetch_attempt(request, data).await,
            Step::FetchStatistics => self.fetch_statistics(request, data).await,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        params: &OperationParams,
    ) -> Result<T, DialogueError> {
        let value = self.registry.invoke(operation, params).await?;
        serde_json::from_value(value).map_err(|error| DialogueError::OperationFailure {
            operation: operation.to_string(),
            code: CODE_DECODE_ERROR.to_string(),
            message: error.to_string(),
        })
    }

    async fn resolve_instructor(
        &self,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
        data: &mut RouteData,
    ) -> StepResult {
        let step = Step::ResolveInstructor;
        if let Some(instructor_id) = cache.get(CACHE_INSTRUCTOR_ID) {
            data.instructor_id = instructor_id.clone();
            return Ok(());
        }

        let value: Value = self
            .call(OP_GET_INSTRUCTOR_ID, &OperationParams::new())
            .await
            .map_err(|error| step_failure(request.intent, step, error))?;
        let Some(instructor_id) =
            value[PARAM_INSTRUCTOR_ID].as_str().filter(|id| !id.trim().is_empty())
        else {
            return Err(OperationResult::failure(
                request.intent,
                step.as_str(),
                "ExamBuilder did not return an instructor id.",
                Some(step.hint().to_string()),
            ));
        };

        cache.insert(CACHE_INSTRUCTOR_ID.to_string(), instructor_id.to_string());
        data.instructor_id = instructor_id.to_string();
        Ok(())
    }

    async fn load_exams(
        &self,
        step: Step,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
        data: &RouteData,
        name_filter: Option<&str>,
    ) -> Result<Vec<Exam>, OperationResult> {
        let mut params = instructor_params(data);
        if let Some(name) = name_filter {
            params.insert(PARAM_EXAM_NAME.to_string(), name.to_string());
        }

        let exams: Vec<Exam> = self
            .call(OP_LIST_EXAMS, &params)
            .await
            .map_err(|error| step_failure(request.intent, step, error))?;
        for exam in &exams {
            cache.insert(format!("{EXAM_CACHE_PREFIX}{}", exam.name), exam.exam_id.clone());
        }
        Ok(exams)
    }

    async fn list_students(
        &self,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
        data: &mut RouteData,
    ) -> StepResult {
        let mut params = instructor_params(data);
        for (field, key) in
            [(SlotField::FirstName, PARAM_FIRST_NAME), (SlotField::LastName, PARAM_LAST_NAME)]
        {
            if let Some(value) = request.filters.get(field) {
                params.insert(key.to_string(), value.to_string());
            }
        }

        let students: Vec<Student> = self
            .call(OP_LIST_STUDENTS, &params)
            .await
            .map_err(|error| step_failure(request.intent, Step::ListStudents, error))?;
        for student in &students {
            cache_student(cache, student);
        }
        data.students = Some(students);
        Ok(())
    }

    async fn create_student(
        &self,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
        data: &mut RouteData,
    ) -> StepResult {
        let slots = request.slots;
        let student_id = slots.get(SlotField::AccountIdentifier).unwrap_or_default();
        let mut params = instructor_params(data);
        for (field, key) in [
            (SlotField::FirstName, PARAM_FIRST_NAME),
            (SlotField::LastName, PARAM_LAST_NAME),
            (SlotField::AccountIdentifier, PARAM_STUDENT_ID),
            (SlotField::Password, PARAM_PASSWORD),
        ] {
            params.insert(key.to_string(), slots.get(field).unwrap_or_default().to_string());
        }

        match self.call::<Student>(OP_CREATE_STUDENT, &params).await {
            Ok(student) => {
                cache_student(cache, &student);
                data.created = Some(student);
                Ok(())
            }
            Err(error) if has_code(&error, &[CODE_STUDENT_ALREADY_EXISTS]) => {
                Err(OperationResult::AlreadyExists {
                    intent: request.intent,
                    subject: student_id.to_string(),
                    message: format!("An account with Student ID '{student_id}' already exists."),
                })
            }
            Err(error) => Err(step_failure(request.intent, Step::CreateStudent, error)),
        }
    }

    async fn resolve_exam(
        &self,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
        data: &mut RouteData,
    ) -> StepResult {
        let step = Step::ResolveExam;
        let query = request.slots.get(SlotField::ExamName).unwrap_or_default();
        if is_hex_id(query) {
            data.exam = Some(Exam {
                exam_id: query.to_string(),
                name: query.to_string(),
                active: true,
                created_at: None,
            });
            return Ok(());
        }

        let exams = self.load_exams(step, request, cache, data, None).await?;
        data.listed = true;

        if let Some(selection) = selection_for(request, step) {
            if let Some(exam) =
                exams.iter().find(|exam| exam.exam_id == selection.candidate.reference)
            {
                return accept_exam(request, exam.clone(), data);
            }
        }

        let names: Vec<&str> = exams.iter().map(|exam| exam.name.as_str()).collect();
        let matches = match_names(query, &names, self.fuzzy_max_distance);
        match matches.as_slice() {
            [] => Err(OperationResult::failure(
                request.intent,
                step.as_str(),
                format!("I couldn't find an exam named '{query}'."),
                Some(step.hint().to_string()),
            )
            .with_retry_field(SlotField::ExamName)),
            [index] => accept_exam(request, exams[*index].clone(), data),
            several => Err(OperationResult::Ambiguous {
                intent: request.intent,
                step: step.as_str().to_string(),
                query: query.to_string(),
                reason: AmbiguityReason::MultipleMatches,
                candidates: several
                    .iter()
                    .map(|index| {
                        let exam = &exams[*index];
                        Candidate {
                            label: exam.name.clone(),
                            reference: exam.exam_id.clone(),
                            detail: Some(
                                if exam.active { "Ready for scheduling" } else { "Inactive" }
                                    .to_string(),
                            ),
                        }
                    })
                    .collect(),
                subject: None,
            }),
        }
    }

    async fn resolve_student(
        &self,
        request: &DispatchRequest<'_>,
        cache: &mut BTreeMap<String, String>,
        data: &mut RouteData,
    ) -> StepResult {
        let step = Step::ResolveStudent;
        let identifier = request.slots.get(SlotField::AccountIdentifier).unwrap_or_default();
        if is_hex_id(identifier) {
            data.student = Some(Student {
                user_id: identifier.to_string(),
                student_id: identifier.to_string(),
                first_name: String::new(),
                last_name: String::new(),
            });
            return Ok(());
        }

        let login = identifier.to_lowercase();
        if let Some(user_id) = cache.get(&format!("{STUDENT_CACHE_PREFIX}{login}")) {
            let name =
                cache.get(&format!("{STUDENT_NAME_CACHE_PREFIX}{login}")).cloned().unwrap_or_default();
            data.student = Some(Student {
                user_id: user_id.clone(),
                student_id: identifier.to_string(),
                first_name: name,
                last_name: String::new(),
            });
            return Ok(());
        }

        let mut params = instructor_params(data);
        params.insert(PARAM_STUDENT_ID.to_string(), identifier.to_string());
        match self.call::<Student>(OP_SEARCH_STUDENT, &params).await {
            Ok(student) => {
                cache_student(cache, &student);
                data.student = Some(student);
                Ok(())
            }
            Err(error) if has_code(&error, &[CODE_NOT_FOUND]) => Err(OperationResult::failure(
                request.intent,
                step.as_str(),
                format!("I couldn't find a student with ID '{identifier}'."),
                Some(step.hint().to_string()),
            )
            .with_retry_field(SlotField::AccountIdentifier)),
            Err(error) => Err(step_failure(request.intent, step, error)),
        }
    }

    async fn check_existing_schedule(
        &self,
        request: &DispatchRequest<'_>,
        data: &mut RouteData,
    ) -> StepResult {
        let step = Step::CheckExistingSchedule;
        let (Some(exam), Some(student)) = (&data.exam, &data.student) else {
            return Err(incomplete(request.intent, step));
        };

        let mut params = instructor_params(data);
        params.insert(PARAM_USER_ID.to_string(), student.user_id.clone());
        params.insert(PARAM_EXAM_ID.to_string(), exam.exam_id.clone());
        let scheduled: Vec<ScheduledExam> = self
            .call(OP_LIST_SCHEDULED_EXAMS, &params)
            .await
            .map_err(|error| step_failure(request.intent, step, error))?;

        if scheduled.iter().any(|entry| entry.exam_id == exam.exam_id) {
            return Err(already_scheduled(request.intent, exam, student));
        }
        Ok(())
    }

    async fn schedule_exam(&self, request: &DispatchRequest<'_>, data: &mut RouteData) -> StepResult {
        let step = Step::ScheduleExam;
        let (Some(exam), Some(student)) = (&data.exam, &data.student) else {
            return Err(incomplete(request.intent, step));
        };

        let mut params = instructor_params(data);
        params.insert(PARAM_EXAM_ID.to_string(), exam.exam_id.clone());
        params.insert(PARAM_USER_ID.to_string(), student.user_id.clone());
        match self.call::<ScheduleConfirmation>(OP_SCHEDULE_EXAM, &params).await {
            Ok(confirmation) => {
                data.confirmation = Some(confirmation);
                Ok(())
            }
            Err(error)
                if has_code(
                    &error,
                    &[CODE_STUDENT_ALREADY_SCHEDULED, CODE_STUDENT_ALREADY_EXISTS],
                ) =>
            {
                Err(already_scheduled(request.intent, exam, student))
            }
            Err(error) => Err(step_failure(request.intent, step, error)),
        }
    }

    async fn list_scheduled(&self, request: &DispatchRequest<'_>, data: &mut RouteData) -> StepResult {
        let step = Step::ListScheduled;
        let Some(student) = &data.student else {
            return Err(incomplete(request.intent, step));
        };

        let mut params = instructor_params(data);
        params.insert(PARAM_USER_ID.to_string(), student.user_id.clone());
        let scheduled: Vec<ScheduledExam> = self
            .call(OP_LIST_SCHEDULED_EXAMS, &params)
            .await
            .map_err(|error| step_failure(request.intent, step, error))?;
        data.scheduled = Some(scheduled);
        Ok(())
    }

    fn select_scheduled_exam(&self, request: &DispatchRequest<'_>, data: &mut RouteData) -> StepResult {
        let step = Step::SelectScheduledExam;
        let scheduled = data.scheduled.as_deref().unwrap_or_default();
        let student_name =
            data.student.as_ref().map(Student::display_name).unwrap_or_else(|| "This student".to_string());

        if scheduled.is_empty() {
            return Err(OperationResult::failure(
                request.intent,
                step.as_str(),
                format!("{student_name} doesn't have any scheduled exams yet."),
                Some("You can schedule one with 'schedule <exam name> for <email>'.".to_string()),
            ));
        }

        let query = request.slots.get(SlotField::ExamName).unwrap_or_default();
        let chosen_reference = selection_for(request, step)
            .map(|selection| selection.candidate.reference.as_str())
            .or_else(|| is_hex_id(query).then_some(query));
        if let Some(reference) = chosen_reference {
            if let Some(entry) = scheduled.iter().find(|entry| entry.user_exam_id == reference) {
                data.selected = Some(entry.clone());
                return Ok(());
            }
        }

        data.listed = true;
        let names: Vec<&str> = scheduled.iter().map(|entry| entry.exam_name.as_str()).collect();
        let matches = match_names(query, &names, self.fuzzy_max_distance);
        let (reason, offered): (AmbiguityReason, Vec<&ScheduledExam>) = match matches.as_slice() {
            [index] => {
                data.selected = Some(scheduled[*index].clone());
                return Ok(());
            }
            [] => (AmbiguityReason::NoMatch, scheduled.iter().collect()),
            several => {
                (AmbiguityReason::MultipleMatches, several.iter().map(|index| &scheduled[*index]).collect())
            }
        };

        Err(OperationResult::Ambiguous {
            intent: request.intent,
            step: step.as_str().to_string(),
            query: query.to_string(),
            reason,
            candidates: offered
                .into_iter()
                .map(|entry| Candidate {
                    label: entry.exam_name.clone(),
                    reference: entry.user_exam_id.clone(),
                    detail: Some(entry.status_label().to_string()),
                })
                .collect(),
            subject: Some(student_name),
        })
    }

    async fn fetch_attempt(&self, request: &DispatchRequest<'_>, data: &mut RouteData) -> StepResult {
        let step = Step::FetchAttempt;
        let (user_exam_id, from_slot) = match &data.selected {
            Some(entry) => (entry.user_exam_id.clone(), false),
            None => (request.slots.get(SlotField::ReferenceCode).unwrap_or_default().to_string(), true),
        };

        let mut params = instructor_params(data);
        params.insert(PARAM_USER_EXAM_ID.to_string(), user_exam_id.clone());
        match self.call::<ExamAttempt>(OP_GET_EXAM_ATTEMPT, &params).await {
            Ok(attempt) => {
                data.attempt = Some(attempt);
                Ok(())
            }
            Err(error) if has_code(&error, &[CODE_NOT_FOUND]) => {
                let failure = OperationResult::failure(
                    request.intent,
                    step.as_str(),
                    format!("I couldn't find an exam attempt with user exam ID '{user_exam_id}'."),
                    Some(step.hint().to_string()),
                );
                Err(if from_slot { failure.with_retry_field(SlotField::ReferenceCode) } else { failure })
            }
            Err(error) => Err(step_failure(request.intent, step, error)),
        }
    }

    async fn fetch_statistics(&self, request: &DispatchRequest<'_>, data: &mut RouteData) -> StepResult {
        let step = Step::FetchStatistics;
        let Some(student) = &data.student else {
            return Err(incomplete(request.intent, step));
        };
        let user_exam_id = request.slots.get(SlotField::ReferenceCode).unwrap_or_default();

        let mut params = instructor_params(data);
        params.insert(PARAM_USER_ID.to_string(), student.user_id.clone());
        params.insert(PARAM_USER_EXAM_ID.to_string(), user_exam_id.to_string());
        match self.call::<ExamStatistics>(OP_GET_EXAM_STATISTICS, &params).await {
            Ok(statistics) => {
                data.statistics = Some(statistics);
                Ok(())
            }
            Err(error) if has_code(&error, &[CODE_NOT_FOUND]) => Err(OperationResult::failure(
                request.intent,
                step.as_str(),
                format!("No statistics were found for user exam ID '{user_exam_id}'."),
                Some(step.hint().to_string()),
            )
            .with_retry_field(SlotField::ReferenceCode)),
            Err(error) => Err(step_failure(request.intent, step, error)),
        }
    }
}

fn assemble(template: Template, data: RouteData) -> Option<OperationPayload> {
    let payload = match template {
        Template::Status => {
            let exams = data.exams?;
            OperationPayload::Status(SystemStatus {
                instructor_id: data.instructor_id,
                total_exams: exams.len(),
                active_exams: exams.iter().filter(|exam| exam.active).count(),
            })
        }
        Template::ExamCatalog => OperationPayload::Exams(data.exams?),
        Template::StudentRoster => OperationPayload::Students(data.students?),
        Template::StudentCreated => OperationPayload::StudentCreated(data.created?),
        Template::ExamScheduled => OperationPayload::ExamScheduled {
            exam: data.exam?,
            student: data.student?,
            confirmation: data.confirmation?,
        },
        Template::ScheduledExams => {
            OperationPayload::ScheduledExams { student: data.student?, exams: data.scheduled? }
        }
        Template::ExamAttempt => OperationPayload::ExamAttempt(data.attempt?),
        Template::ExamStatistics => OperationPayload::ExamStatistics {
            student: data.student?,
            statistics: data.statistics?,
        },
    };
    Some(payload)
}

fn instructor_params(data: &RouteData) -> OperationParams {
    OperationParams::from([(PARAM_INSTRUCTOR_ID.to_string(), data.instructor_id.clone())])
}

/// Inactive exams are listed as candidates but can never be scheduled.
fn accept_exam(request: &DispatchRequest<'_>, exam: Exam, data: &mut RouteData) -> StepResult {
    if !exam.active {
        return Err(OperationResult::failure(
            request.intent,
            Step::ResolveExam.as_str(),
            format!("'{}' is inactive and can't be scheduled right now.", exam.name),
            Some("Pick one of the exams marked ready for scheduling.".to_string()),
        )
        .with_retry_field(SlotField::ExamName));
    }
    data.exam = Some(exam);
    Ok(())
}

fn selection_for<'a>(request: &'a DispatchRequest<'_>, step: Step) -> Option<&'a Selection> {
    request.selection.filter(|selection| selection.step == step.as_str())
}

fn has_code(error: &DialogueError, codes: &[&str]) -> bool {
    matches!(error, DialogueError::OperationFailure { code, .. } if codes.contains(&code.as_str()))
}

fn cache_student(cache: &mut BTreeMap<String, String>, student: &Student) {
    let login = student.student_id.to_lowercase();
    cache.insert(format!("{STUDENT_CACHE_PREFIX}{login}"), student.user_id.clone());
    cache.insert(format!("{STUDENT_NAME_CACHE_PREFIX}{login}"), student.display_name());
}

fn already_scheduled(intent: Intent, exam: &Exam, student: &Student) -> OperationResult {
    OperationResult::AlreadyExists {
        intent,
        subject: exam.name.clone(),
        message: format!("{} is already scheduled for '{}'.", student.display_name(), exam.name),
    }
}

fn incomplete(intent: Intent, step: Step) -> OperationResult {
    OperationResult::failure(
        intent,
        step.as_str(),
        format!("I couldn't {} because an earlier lookup came back empty.", step.activity()),
        Some("Please try again.".to_string()),
    )
}

fn step_failure(intent: Intent, step: Step, error: DialogueError) -> OperationResult {
    match error {
        DialogueError::OperationTimeout { operation, timeout_ms } => {
            warn!(
                event_name = "agent.dispatch.step.timed_out",
                intent = intent.as_str(),
                step = step.as_str(),
                operation = %operation,
                timeout_ms,
                "dispatch step timed out"
            );
            OperationResult::failure(
                intent,
                step.as_str(),
                format!("ExamBuilder didn't answer in time while I tried to {}.", step.activity()),
                Some("Nothing was changed. Please try again in a moment.".to_string()),
            )
        }
        other => {
            warn!(
                event_name = "agent.dispatch.step.failed",
                intent = intent.as_str(),
                step = step.as_str(),
                error = %other,
                "dispatch step failed"
            );
            let detail = match &other {
                DialogueError::OperationFailure { message, .. } => message.clone(),
                _ => other.to_string(),
            };
            OperationResult::failure(
                intent,
                step.as_str(),
                format!("I couldn't {}: {detail}", step.activity()),
                Some(step.hint().to_string()),
            )
        }
    }
}

/// Exam names seen earlier in the session, for tolerant matching in later turns.
pub fn known_exam_names(cache: &BTreeMap<String, String>) -> Vec<String> {
    cache
        .keys()
        .filter_map(|key| key.strip_prefix(EXAM_CACHE_PREFIX))
        .map(str::to_string)
        .collect()
}

/// Resolves a reply to a candidate list by position, reference or name.
pub fn resolve_selection(
    utterance: &str,
    result: &OperationResult,
    max_distance: usize,
) -> Option<Selection> {
    let OperationResult::Ambiguous { step, candidates, .. } = result else {
        return None;
    };
    let reply = utterance.trim();

    let candidate = parse_ordinal(reply, candidates.len())
        .and_then(|index| candidates.get(index))
        .or_else(|| candidates.iter().find(|candidate| candidate.reference.eq_ignore_ascii_case(reply)))
        .or_else(|| {
            let labels: Vec<&str> = candidates.iter().map(|candidate| candidate.label.as_str()).collect();
            match match_names(reply, &labels, max_distance).as_slice() {
                [index] => candidates.get(*index),
                _ => None,
            }
        })?;

    Some(Selection { step: step.clone(), candidate: candidate.clone() })
}
