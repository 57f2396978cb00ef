use futures::try_join;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::hub::{ensure_not_banned, Hub};
use crate::models::{
    collections, decode, decode_all, AdminStats, NewReport, Profile, Report, ReportStatus,
    ReportTargetType,
};
use crate::store::{Filter, Order};

fn target_collection(target_type: ReportTargetType) -> &'static str {
    match target_type {
        ReportTargetType::Post => collections::REPAIR_POSTS,
        ReportTargetType::Comment => collections::COMMENTS,
        ReportTargetType::Guide => collections::GUIDES,
        ReportTargetType::User => collections::PROFILES,
    }
}

impl Hub {
    pub(crate) fn require_admin(&self, viewer: &Profile) -> AppResult<()> {
        if viewer.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin capability required".to_string()))
        }
    }

    pub async fn submit_report(&self, viewer: &Profile, input: NewReport) -> AppResult<Report> {
        ensure_not_banned(viewer)?;
        self.ensure_exists(target_collection(input.target_type), &input.target_id)
            .await?;

        let mut document = serde_json::to_value(&input)?;
        if let Some(fields) = document.as_object_mut() {
            fields.insert("reporter_id".to_string(), Value::String(viewer.id.clone()));
            fields.insert("status".to_string(), json!(ReportStatus::Open));
        }
        let record = self.store.insert(collections::REPORTS, document).await?;
        let report: Report = decode(record)?;
        info!(report_id = %report.id, target_id = %report.target_id, "report submitted");
        Ok(report)
    }

    /// Open reports first, newest first within each group.
    pub async fn list_reports(&self, viewer: &Profile) -> AppResult<Vec<Report>> {
        self.require_admin(viewer)?;
        let records = self
            .store
            .select(
                collections::REPORTS,
                &Filter::new(),
                &Order::desc("created_at"),
            )
            .await?;
        let mut reports: Vec<Report> = decode_all(records)?;
        reports.sort_by_key(|report| match report.status {
            ReportStatus::Open => 0,
            _ => 1,
        });
        Ok(reports)
    }

    pub async fn resolve_report(
        &self,
        viewer: &Profile,
        id: &str,
        status: ReportStatus,
    ) -> AppResult<Report> {
        self.require_admin(viewer)?;
        self.ensure_exists(collections::REPORTS, id).await?;
        let updated = self
            .store
            .update(collections::REPORTS, id, json!({ "status": status }))
            .await?;
        decode(updated)
    }

    pub async fn stats(&self, viewer: &Profile) -> AppResult<AdminStats> {
        self.require_admin(viewer)?;
        let everything = Filter::new();
        let (total_users, total_posts, total_guides, total_comments) = try_join!(
            self.store.count(collections::PROFILES, &everything),
            self.store.count(collections::REPAIR_POSTS, &everything),
            self.store.count(collections::GUIDES, &everything),
            self.store.count(collections::COMMENTS, &everything),
        )?;
        Ok(AdminStats {
            total_users,
            total_posts,
            total_guides,
            total_comments,
        })
    }

    pub async fn set_banned(
        &self,
        viewer: &Profile,
        user_id: &str,
        banned: bool,
    ) -> AppResult<Profile> {
        self.require_admin(viewer)?;
        if viewer.id == user_id {
            return Err(AppError::Validation(
                "you cannot change your own ban status".to_string(),
            ));
        }
        self.ensure_exists(collections::PROFILES, user_id).await?;
        let updated = self
            .store
            .update(
                collections::PROFILES,
                user_id,
                json!({ "is_banned": banned }),
            )
            .await?;
        info!(user_id, banned, "updated ban status");
        decode(updated)
    }
}
