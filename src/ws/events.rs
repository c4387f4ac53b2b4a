//! Server→client event envelope.
//!
//! Serialized as JSON with a `type` discriminator the client dispatches on.
//! Task mutations carry the recomputed parent project so dashboards can
//! update completed/total counts without a refetch.

use serde::Serialize;

use crate::db::models::{Activity, ChatMessage, Invitation, Project, Task};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "project-updated")]
    ProjectUpdated { project: Project },
    #[serde(rename = "project-deleted")]
    ProjectDeleted {
        #[serde(rename = "projectId")]
        project_id: i64,
    },
    #[serde(rename = "task-created")]
    TaskCreated { task: Task, project: Project },
    #[serde(rename = "task-updated")]
    TaskUpdated { task: Task, project: Project },
    #[serde(rename = "task-deleted")]
    TaskDeleted {
        #[serde(rename = "taskId")]
        task_id: i64,
        project: Project,
    },
    #[serde(rename = "new-activity")]
    NewActivity { activity: Activity },
    #[serde(rename = "member-joined")]
    MemberJoined {
        #[serde(rename = "projectId")]
        project_id: i64,
        email: String,
    },
    #[serde(rename = "member-removed")]
    MemberRemoved {
        #[serde(rename = "projectId")]
        project_id: i64,
        email: String,
    },
    #[serde(rename = "member-left")]
    MemberLeft {
        #[serde(rename = "projectId")]
        project_id: i64,
        email: String,
    },
    #[serde(rename = "new-message")]
    NewMessage { message: ChatMessage },
    #[serde(rename = "new-invitation")]
    NewInvitation { invitation: Invitation },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_type_discriminator() {
        let event = ServerEvent::ProjectDeleted { project_id: 42 };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "project-deleted");
        assert_eq!(json["projectId"], 42);
    }

    #[test]
    fn task_event_includes_project_aggregate() {
        let project = Project {
            id: 7,
            name: "Launch".to_string(),
            owner: "alice@x.com".to_string(),
            completed: 1,
            total: 3,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let task = Task {
            id: 99,
            project_id: 7,
            text: "Write docs".to_string(),
            assigned_to: String::new(),
            completed: false,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(
            &serde_json::to_string(&ServerEvent::TaskCreated { task, project }).unwrap(),
        )
        .unwrap();
        assert_eq!(json["type"], "task-created");
        assert_eq!(json["task"]["id"], 99);
        assert_eq!(json["project"]["completed"], 1);
        assert_eq!(json["project"]["total"], 3);
    }
}
