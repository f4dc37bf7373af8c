use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::accounter::view::ViewToken;
use crate::domain::app::application::Application;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::schedule::contrib::manager::ContribManager;
use crate::domain::schedule::contrib::{ContribConfig, PriorityInit};
use crate::domain::schedule::entity::{EntityBinding, EvalEntity};
use crate::domain::schedule::policy::SchedulerPolicy;
use crate::domain::system::SystemView;
use crate::domain::utils::id::{AppUid, BindingRef};
use crate::error::{Error, Result};

/// One scored ⟨application, working mode, binding⟩ candidate.
struct Candidate {
    app: Arc<Application>,
    awm_id: u8,
    binding_ref: BindingRef,
    metric: f32,
    goal_gap: i32,
    awm_value: f32,
}

/// The modular-metric policy: every feasible candidate is scored as a
/// weighted sum of the scoring contributions, candidates are ordered by
/// aggregate metric and dispatched greedily until every application is
/// decided.
///
/// Running the policy twice without an intervening system change yields
/// the same committed assignment: evaluation order and tie-breaking are
/// fully deterministic.
pub struct MetricPolicy {
    accounter: ResourceAccounter,
    contribs: ContribManager,
    binding_domains: Vec<ResourceType>,
    round: u64,
}

impl MetricPolicy {
    pub fn new(accounter: ResourceAccounter, config: ContribConfig) -> Self {
        let contribs = ContribManager::new(accounter.clone(), config);
        Self { accounter, contribs, binding_domains: vec![ResourceType::Cpu, ResourceType::Gpu], round: 0 }
    }

    pub fn with_binding_domains(mut self, domains: Vec<ResourceType>) -> Self {
        self.binding_domains = domains;
        self
    }

    /// Scores every enabled working mode of `app` across the binding
    /// domains, appending to `candidates`.
    fn evaluate_app(&self, system: &SystemView, app: &Arc<Application>, view: ViewToken, candidates: &mut Vec<Candidate>) {
        for awm_handle in app.enabled_working_modes() {
            let entity = EvalEntity::unbound(app.clone(), awm_handle.clone(), view);
            let base = match self.contribs.binding_independent_index(&entity) {
                Ok(v) => v,
                Err(e) => {
                    log::debug!("MetricPolicy: {:?} base index failed: {}", entity, e);
                    continue;
                }
            };
            let (awm_id, awm_value) = {
                let wm = awm_handle.read().expect("working mode lock poisoned");
                (wm.id(), wm.norm_value())
            };

            let mut bound_any = false;
            for domain in &self.binding_domains {
                for instance in system.tree().instances_of(*domain) {
                    let binding_ref = match awm_handle.write().expect("working mode lock poisoned").bind_resources(system.tree(), *domain, instance) {
                        Ok(r) => r,
                        Err(_) => continue,
                    };
                    let bound = entity.bound(EntityBinding { domain: *domain, instance, binding_ref });
                    let dependent = match self.contribs.binding_dependent_index(&bound) {
                        Ok(v) => v,
                        Err(e) => {
                            log::debug!("MetricPolicy: {:?} dependent index failed: {}", bound, e);
                            continue;
                        }
                    };
                    bound_any = true;
                    candidates.push(Candidate {
                        app: app.clone(),
                        awm_id,
                        binding_ref,
                        metric: (base + dependent) / 2.0,
                        goal_gap: app.goal_gap(),
                        awm_value,
                    });
                }
            }

            // Requests that name no binding-domain instance (memory-only
            // working modes, platforms without binding domains) are
            // evaluated on the base metric alone.
            if !bound_any {
                if let Ok(binding_ref) = awm_handle.write().expect("working mode lock poisoned").bind_as_is(system.tree()) {
                    candidates.push(Candidate { app: app.clone(), awm_id, binding_ref, metric: base, goal_gap: app.goal_gap(), awm_value });
                }
            }
        }
    }

    fn dispatch(&self, candidates: Vec<Candidate>, view: ViewToken) -> HashSet<AppUid> {
        let mut decided: HashSet<AppUid> = HashSet::new();
        for c in candidates {
            let uid = c.app.uid();
            if decided.contains(&uid) {
                continue;
            }
            match c.app.schedule_request(c.awm_id, c.binding_ref, &self.accounter, view) {
                Ok(()) => {
                    log::debug!("MetricPolicy: [{}] -> awm{} (metric {:.3})", uid, c.awm_id, c.metric);
                    decided.insert(uid);
                }
                Err(Error::Exhausted(_)) => {
                    // Resource full for this binding: try the next candidate.
                    continue;
                }
                Err(e) => {
                    log::debug!("MetricPolicy: [{}] awm{} rejected: {}", uid, c.awm_id, e);
                    continue;
                }
            }
        }
        decided
    }
}

impl SchedulerPolicy for MetricPolicy {
    fn name(&self) -> &'static str {
        "metric"
    }

    fn schedule(&mut self, system: &SystemView) -> Result<ViewToken> {
        self.round += 1;
        let view = self.accounter.get_view(&format!("metric-round-{}", self.round))?;

        let result = self.schedule_into(system, view);
        if let Err(e) = result {
            // Round-level failure: the candidate view is dropped, the live
            // view stays untouched.
            let _ = self.accounter.put_view(view);
            return Err(e);
        }
        Ok(view)
    }
}

impl MetricPolicy {
    fn schedule_into(&mut self, system: &SystemView, view: ViewToken) -> Result<()> {
        for priority in 0..=system.lowest_priority() {
            let apps = system.schedulable_at_priority(priority);
            if apps.is_empty() {
                continue;
            }
            self.contribs.init_priority(&PriorityInit { priority, app_count: apps.len(), view })?;

            let mut candidates = Vec::new();
            for app in &apps {
                self.evaluate_app(system, app, view, &mut candidates);
            }

            // Higher aggregated metric first; ties prefer a positive goal
            // gap, then a higher working mode value; remaining ties are
            // broken by uid and working mode id for determinism.
            candidates.sort_by(|a, b| {
                b.metric
                    .partial_cmp(&a.metric)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.goal_gap.cmp(&a.goal_gap))
                    .then(b.awm_value.partial_cmp(&a.awm_value).unwrap_or(std::cmp::Ordering::Equal))
                    .then(a.app.uid().cmp(&b.app.uid()))
                    .then(a.awm_id.cmp(&b.awm_id))
            });

            tracing::info!(priority, candidates = candidates.len(), "metric policy: dispatching priority level");
            let decided = self.dispatch(candidates, view);

            // Applications whose committed working mode was invalidated by
            // a constraint must either migrate (handled above) or block.
            for app in &apps {
                if !decided.contains(&app.uid()) && app.is_current_awm_invalid() {
                    log::info!("MetricPolicy: [{}] invalidated with no feasible candidate, blocking", app.uid());
                    let _ = app.unschedule();
                }
            }
        }
        Ok(())
    }
}
