use super::task::TaskInstance;
use std::collections::HashMap;

/// Separator for stack keys. The unit-separator control character cannot be
/// typed into a name field; a name containing it may collide.
pub const STACK_KEY_SEPARATOR: &str = "\u{1f}::";

/// A display group of task instances sharing name, project and client
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    pub key: String,
    /// Members in input order
    pub members: Vec<TaskInstance>,
    pub total_duration: i64,
    pub total_cost: f64,
    /// Index into `members` of the most recently used member
    latest: usize,
}

impl TaskGroup {
    fn new(key: String, first: TaskInstance) -> Self {
        Self {
            key,
            total_duration: first.total_time,
            total_cost: first.cost_of(first.total_time),
            members: vec![first],
            latest: 0,
        }
    }

    fn push(&mut self, member: TaskInstance) {
        self.total_duration += member.total_time;
        self.total_cost += member.cost_of(member.total_time);
        // Strictly greater: ties stay with the first seen member
        if member.last_used_at > self.members[self.latest].last_used_at {
            self.latest = self.members.len();
        }
        self.members.push(member);
    }

    /// The member with the greatest `last_used_at`
    pub fn latest_task(&self) -> &TaskInstance {
        &self.members[self.latest]
    }

    /// A group with more than one member is shown as a stack, otherwise as a plain row
    pub fn is_stack(&self) -> bool {
        self.members.len() > 1
    }

    pub fn member_ids(&self) -> Vec<i64> {
        self.members.iter().map(|m| m.id).collect()
    }
}

/// Build the stack key for a (name, project, client) triple
pub fn stack_key(name: &str, project_name: Option<&str>, client_name: Option<&str>) -> String {
    [name, project_name.unwrap_or(""), client_name.unwrap_or("")].join(STACK_KEY_SEPARATOR)
}

/// Stack key of an instance
pub fn key_of(instance: &TaskInstance) -> String {
    stack_key(
        &instance.name,
        instance.project_name.as_deref(),
        instance.client_name.as_deref(),
    )
}

/// Group instances into stacks by exact (name, project, client) equality.
/// Groups appear in first-encountered order.
pub fn group(instances: &[TaskInstance]) -> Vec<TaskGroup> {
    let mut groups: Vec<TaskGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for instance in instances {
        let key = key_of(instance);
        match index.get(&key) {
            Some(&idx) => groups[idx].push(instance.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(TaskGroup::new(key, instance.clone()));
            }
        }
    }

    groups
}

/// Human-readable label for a stack key ("Design · Acme · Acme")
pub fn display_key(key: &str) -> String {
    key.split(STACK_KEY_SEPARATOR)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" · ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn design(id: i64, total: i64) -> TaskInstance {
        let mut instance = TaskInstance::new(id, "Design")
            .with_project(1, "Acme")
            .with_total_time(total);
        instance.client_id = Some(1);
        instance.client_name = Some("Acme".to_string());
        instance.client_rate = 36.0;
        instance
    }

    fn at(hour: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_group_sums_same_triple() {
        let groups = group(&[design(1, 100), design(2, 200)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].total_duration, 300);
        assert_eq!(groups[0].member_ids(), vec![1, 2]);
        assert!(groups[0].is_stack());
        // 300s at 36/h
        assert!((groups[0].total_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_is_order_stable() {
        let other = TaskInstance::new(3, "Review");
        let groups = group(&[design(1, 100), other.clone(), design(2, 200)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].member_ids(), vec![1, 2]);
        assert_eq!(groups[1].member_ids(), vec![3]);

        let reversed = group(&[design(2, 200), other, design(1, 100)]);
        assert_eq!(reversed[0].member_ids(), vec![2, 1]);
        assert_eq!(reversed[0].total_duration, 300);
    }

    #[test]
    fn test_changing_any_key_part_splits() {
        let base = design(1, 100);

        let mut renamed = design(2, 100);
        renamed.name = "Design!".to_string();
        assert_eq!(group(&[base.clone(), renamed]).len(), 2);

        let mut other_project = design(2, 100);
        other_project.project_name = Some("Globex".to_string());
        assert_eq!(group(&[base.clone(), other_project]).len(), 2);

        let mut other_client = design(2, 100);
        other_client.client_name = None;
        assert_eq!(group(&[base, other_client]).len(), 2);
    }

    #[test]
    fn test_missing_names_key_as_empty() {
        assert_eq!(
            stack_key("Design", None, None),
            format!("Design{}{}", STACK_KEY_SEPARATOR, STACK_KEY_SEPARATOR)
        );
        assert_eq!(key_of(&TaskInstance::new(1, "Design")), stack_key("Design", None, None));
    }

    #[test]
    fn test_latest_task_picks_max_last_used() {
        let a = design(1, 10).with_last_used_at(at(9));
        let b = design(2, 10).with_last_used_at(at(11));
        let c = design(3, 10).with_last_used_at(at(10));
        let groups = group(&[a, b, c]);
        assert_eq!(groups[0].latest_task().id, 2);
    }

    #[test]
    fn test_latest_task_ties_go_to_first_seen() {
        let a = design(1, 10).with_last_used_at(at(9));
        let b = design(2, 10).with_last_used_at(at(9));
        let never = design(3, 10);
        let groups = group(&[never, a, b]);
        assert_eq!(groups[0].latest_task().id, 1);
    }

    #[test]
    fn test_single_member_is_not_a_stack() {
        let groups = group(&[design(1, 10)]);
        assert!(!groups[0].is_stack());
        assert_eq!(groups[0].latest_task().id, 1);
    }

    #[test]
    fn test_display_key() {
        assert_eq!(display_key(&stack_key("Design", Some("Acme"), None)), "Design · Acme");
    }
}
