//! Request assembly: deterministic task ordering and prompt rendering.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use dayplan_db::models::{Preferences, TaskId};

use crate::clock::{ceil_to_minute, hhmm};
use crate::generator::GenerationPrompt;
use crate::task::Task;

/// The immutable scheduling specification for one planning run.
///
/// Fields are private so the task order established by [`ScheduleRequest::new`]
/// cannot be disturbed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    date: NaiveDate,
    tasks: Vec<Task>,
    preferences: Preferences,
    reference_time: NaiveDateTime,
    flagged: BTreeSet<TaskId>,
}

impl ScheduleRequest {
    /// Assemble a request. `tasks` are sorted with [`order_tasks`].
    pub fn new(
        date: NaiveDate,
        mut tasks: Vec<Task>,
        preferences: Preferences,
        reference_time: NaiveDateTime,
    ) -> Self {
        order_tasks(&mut tasks);
        Self {
            date,
            tasks,
            preferences,
            reference_time,
            flagged: BTreeSet::new(),
        }
    }

    /// Copy of this request annotating `flagged` as left unscheduled by a
    /// previous attempt.
    pub fn with_flagged(&self, flagged: impl IntoIterator<Item = TaskId>) -> Self {
        Self {
            flagged: flagged.into_iter().collect(),
            ..self.clone()
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Tasks in scheduling order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn reference_time(&self) -> NaiveDateTime {
        self.reference_time
    }

    pub fn flagged(&self) -> &BTreeSet<TaskId> {
        &self.flagged
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Earliest time work can be placed: `work_start`, or the reference
    /// time (rounded up to the minute) when planning for the reference date
    /// and the day is already under way.
    pub fn effective_start(&self) -> NaiveTime {
        let work_start = self.preferences.work_start;
        if self.reference_time.date() == self.date {
            ceil_to_minute(self.reference_time.time()).max(work_start)
        } else {
            work_start
        }
    }

    /// Render the prompt sent to the generation engine.
    pub fn build_prompt(&self) -> GenerationPrompt {
        GenerationPrompt {
            system: build_system_prompt(&self.preferences),
            user: self.build_user_prompt(),
        }
    }

    fn build_user_prompt(&self) -> String {
        let prefs = &self.preferences;
        let mut prompt = String::with_capacity(2048);

        prompt.push_str(&format!("Date: {}\n", self.date.format("%A, %B %d, %Y")));
        prompt.push_str(&format!(
            "Current time: {}\n\n",
            self.reference_time.format("%Y-%m-%d %H:%M")
        ));

        prompt.push_str("## Preferences\n\n");
        prompt.push_str(&format!(
            "- Working hours: {} - {}\n",
            hhmm(prefs.work_start),
            hhmm(prefs.work_end)
        ));
        prompt.push_str(&format!(
            "- Earliest start: {}\n",
            hhmm(self.effective_start())
        ));
        prompt.push_str(&format!(
            "- Break: {} min after at most {} min of continuous work\n",
            prefs.break_interval_minutes, prefs.max_block_minutes
        ));
        prompt.push_str(&format!(
            "- Deep work: {}\n\n",
            if prefs.deep_work_enabled {
                "enabled"
            } else {
                "disabled"
            }
        ));

        prompt.push_str("## Tasks to schedule\n\n");
        for task in &self.tasks {
            prompt.push_str(&format!("- task_id {}: {}\n", task.id.0, task.summary()));
        }

        if !self.flagged.is_empty() {
            prompt.push_str(
                "\n## Previous attempt left these unscheduled\n\n\
                 Every one of these tasks MUST appear in the schedule this time:\n\n",
            );
            for id in &self.flagged {
                if let Some(task) = self.task(*id) {
                    prompt.push_str(&format!("- task_id {}: {}\n", id.0, task.name));
                }
            }
        }

        prompt.push('\n');
        prompt.push_str(REPLY_SCHEMA);
        prompt
    }
}

/// Sort tasks into scheduling order: priority (high first), then deadline
/// (earliest first, none last), then input order.
pub fn order_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_tasks);
}

fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| deadline_key(a).cmp(&deadline_key(b)))
        .then_with(|| a.id.cmp(&b.id))
}

fn deadline_key(task: &Task) -> (bool, Option<NaiveTime>) {
    (task.deadline.is_none(), task.deadline)
}

// ---------------------------------------------------------------------------
// Prompt text
// ---------------------------------------------------------------------------

const REPLY_SCHEMA: &str = r#"## Reply format

Reply with a single JSON object and nothing else:

```json
{
  "blocks": [
    {
      "task_id": 0,
      "title": "task name",
      "start": "HH:MM",
      "end": "HH:MM",
      "description": "what to do in this block",
      "rationale": "why this slot was chosen"
    }
  ],
  "overall_rationale": "your reasoning for the schedule as a whole"
}
```

Use exactly one block per task, copy `task_id` from the task list, use
24-hour `HH:MM` times, and keep blocks in chronological order without
overlaps.
"#;

fn build_system_prompt(prefs: &Preferences) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(
        "You are an expert productivity assistant that creates optimal daily schedules. \
         Given a list of tasks, create a time-blocked schedule that respects task \
         priorities, estimated durations, deadlines, and energy levels through the day.\n\n",
    );
    prompt.push_str("Guidelines:\n");
    prompt.push_str(&format!(
        "1. Allocate focused time blocks of at most {} minutes.\n",
        prefs.max_block_minutes
    ));
    if prefs.deep_work_enabled {
        prompt.push_str(
            "2. Schedule high-priority tasks during peak energy hours (typically morning).\n",
        );
    } else {
        prompt.push_str("2. Schedule high-priority tasks first.\n");
    }
    prompt.push_str(&format!(
        "3. Leave a {} minute break after long stretches of continuous work.\n",
        prefs.break_interval_minutes
    ));
    prompt.push_str("4. Finish every task with a deadline before that deadline.\n");
    prompt.push_str(&format!(
        "5. Keep every block within working hours ({} - {}).\n",
        hhmm(prefs.work_start),
        hhmm(prefs.work_end)
    ));
    prompt.push_str("6. Be realistic about what can be accomplished in a day.\n");

    prompt
}

#[cfg(test)]
mod tests {
    use dayplan_db::models::Priority;

    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn task(id: u32, priority: Priority, deadline: Option<NaiveTime>) -> Task {
        Task {
            id: TaskId(id),
            name: format!("task {id}"),
            priority,
            duration_minutes: 30,
            deadline,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<u32> {
        tasks.iter().map(|t| t.id.0).collect()
    }

    #[test]
    fn orders_by_priority_then_deadline_then_input() {
        let mut tasks = vec![
            task(0, Priority::Low, None),
            task(1, Priority::Normal, None),
            task(2, Priority::High, None),
            task(3, Priority::Normal, Some(t(15, 0))),
            task(4, Priority::Normal, Some(t(11, 0))),
            task(5, Priority::High, None),
        ];
        order_tasks(&mut tasks);
        assert_eq!(ids(&tasks), vec![2, 5, 4, 3, 1, 0]);
    }

    #[test]
    fn ordering_is_a_total_order() {
        let mut tasks = Vec::new();
        let priorities = [Priority::High, Priority::Normal, Priority::Low];
        let deadlines = [None, Some(t(10, 0)), Some(t(16, 0))];
        let mut id = 0;
        for p in priorities {
            for d in deadlines {
                tasks.push(task(id, p, d));
                id += 1;
            }
        }

        let mut forward = tasks.clone();
        let mut backward: Vec<Task> = tasks.into_iter().rev().collect();
        order_tasks(&mut forward);
        order_tasks(&mut backward);
        assert_eq!(forward, backward, "order must not depend on input permutation");

        for pair in forward.windows(2) {
            assert_eq!(compare_tasks(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn new_sorts_tasks() {
        let request = ScheduleRequest::new(
            date(),
            vec![task(0, Priority::Low, None), task(1, Priority::High, None)],
            Preferences::default(),
            date().and_time(t(8, 0)),
        );
        assert_eq!(ids(request.tasks()), vec![1, 0]);
        assert_eq!(request.task(TaskId(0)).unwrap().priority, Priority::Low);
        assert!(request.task(TaskId(9)).is_none());
    }

    #[test]
    fn effective_start_on_reference_date() {
        let make = |at: NaiveDateTime| {
            ScheduleRequest::new(date(), vec![], Preferences::default(), at)
        };

        assert_eq!(make(date().and_time(t(7, 30))).effective_start(), t(9, 0));
        assert_eq!(make(date().and_time(t(11, 15))).effective_start(), t(11, 15));

        let with_secs = date().and_hms_opt(11, 15, 30).unwrap();
        assert_eq!(make(with_secs).effective_start(), t(11, 16));
    }

    #[test]
    fn effective_start_ignores_reference_on_other_dates() {
        let yesterday = date().pred_opt().unwrap();
        let request = ScheduleRequest::new(
            date(),
            vec![],
            Preferences::default(),
            yesterday.and_time(t(15, 0)),
        );
        assert_eq!(request.effective_start(), t(9, 0));
    }

    #[test]
    fn prompt_lists_tasks_and_preferences() {
        let request = ScheduleRequest::new(
            date(),
            vec![
                Task {
                    id: TaskId(0),
                    name: "Write report".to_string(),
                    priority: Priority::High,
                    duration_minutes: 90,
                    deadline: Some(t(12, 0)),
                },
                task(1, Priority::Low, None),
            ],
            Preferences::default(),
            date().and_time(t(8, 0)),
        );
        let prompt = request.build_prompt();

        assert!(prompt.system.contains("at most 90 minutes"));
        assert!(prompt.system.contains("peak energy"));
        assert!(prompt.system.contains("09:00 - 18:00"));

        assert!(prompt.user.contains("Friday, March 14, 2025"));
        assert!(prompt.user.contains(
            "- task_id 0: Write report | Priority: High | Duration: 90 min | Due: 12:00"
        ));
        assert!(prompt.user.contains("- task_id 1: task 1"));
        assert!(prompt.user.contains("\"overall_rationale\""));
        assert!(!prompt.user.contains("Previous attempt"));
    }

    #[test]
    fn prompt_without_deep_work() {
        let prefs = Preferences {
            deep_work_enabled: false,
            ..Preferences::default()
        };
        let request =
            ScheduleRequest::new(date(), vec![], prefs, date().and_time(t(8, 0)));
        let prompt = request.build_prompt();
        assert!(!prompt.system.contains("peak energy"));
        assert!(prompt.user.contains("Deep work: disabled"));
    }

    #[test]
    fn flagged_tasks_are_called_out() {
        let request = ScheduleRequest::new(
            date(),
            vec![task(0, Priority::Normal, None), task(1, Priority::Normal, None)],
            Preferences::default(),
            date().and_time(t(8, 0)),
        );
        let retry = request.with_flagged([TaskId(1)]);

        assert!(retry.flagged().contains(&TaskId(1)));
        assert_eq!(retry.tasks(), request.tasks());

        let prompt = retry.build_prompt();
        let section = prompt
            .user
            .split("## Previous attempt left these unscheduled")
            .nth(1)
            .expect("retry prompt should list flagged tasks");
        assert!(section.contains("task_id 1: task 1"));
        assert!(!section.contains("task_id 0: task 0"));
    }
}
