use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::web::{
    AppState, autobackup, backup, files, folders, marks, questions, stats, subjects, systems,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/subjects",
            get(subjects::list_subjects)
                .post(subjects::create_subject)
                .delete(subjects::delete_subject),
        )
        .route(
            "/api/systems",
            get(systems::list_systems)
                .post(systems::create_system)
                .delete(systems::delete_system),
        )
        .route(
            "/api/marks",
            get(marks::list_marks)
                .post(marks::create_marks)
                .put(marks::update_marks)
                .delete(marks::delete_marks),
        )
        .route(
            "/api/questions",
            get(questions::list_questions)
                .post(questions::create_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        .route(
            "/api/folders",
            get(folders::list_folders)
                .post(folders::create_folder)
                .put(folders::update_folder)
                .delete(folders::delete_folder),
        )
        .route(
            "/api/files",
            get(files::list_files)
                .post(files::upload_file)
                .put(files::move_file)
                .delete(files::delete_file),
        )
        .route("/api/stats", get(stats::get_stats))
        .route(
            "/api/backup",
            get(backup::backup_get)
                .post(backup::restore_backup)
                .delete(backup::delete_backup),
        )
        .route(
            "/api/autobackup",
            get(autobackup::autobackup_get).post(autobackup::update_config),
        )
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
