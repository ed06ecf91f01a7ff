//! Manifest template store.
//!
//! A template is runtime text holding one macro per manifest section:
//!
//! ```text
//! {% macro SERVICE(spec) %}
//! apiVersion: v1
//! kind: Service
//! metadata:
//!   name: zcashd-svc-{{ spec.Name }}
//! {% endmacro %}
//! ```
//!
//! Sections are looked up when rendered, so a template that lacks a section
//! only fails when that section is asked for.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use minijinja::{context, Environment, UndefinedBehavior, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ManagerError, ManagerResult};
use crate::manifest::Manifest;
use crate::model::InstanceType;

pub const NAMESPACE: &str = "NAMESPACE";
pub const ZCASH_CONF: &str = "ZCASH_CONF";
pub const LWD_CONF: &str = "LWD_CONF";
pub const ENVOY_CONF: &str = "ENVOY_CONF";
pub const CREDENTIALS: &str = "CREDENTIALS";
pub const DEPLOYMENT: &str = "DEPLOYMENT";
pub const SERVICE: &str = "SERVICE";
pub const INGRESS: &str = "INGRESS";
pub const INGRESS_STOPPED: &str = "INGRESS_STOPPED";
pub const INGRESS_INCLUDE: &str = "INGRESS_INCLUDE";
pub const VOLUME: &str = "VOLUME";
pub const SNAPSHOT: &str = "SNAPSHOT";
pub const SCHEDULE_SNAPSHOT: &str = "SCHEDULE_SNAPSHOT";

const APP_TEMPLATE: &str = "app";
const PROJECT_TEMPLATE: &str = "project";

/// A parsed template. Cloning shares the compiled environment.
#[derive(Clone)]
pub struct ManifestTemplate {
    name: String,
    env: Arc<Environment<'static>>,
}

impl std::fmt::Debug for ManifestTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestTemplate")
            .field("name", &self.name)
            .finish()
    }
}

impl ManifestTemplate {
    /// Parse an app or project template.
    pub fn new(name: &str, source: &str) -> ManagerResult<Self> {
        Self::build(name, source, false)
    }

    /// Parse an instance template, which also gets the `b64encode` filter.
    pub fn new_instance(name: &str, source: &str) -> ManagerResult<Self> {
        Self::build(name, source, true)
    }

    fn build(name: &str, source: &str, instance_functions: bool) -> ManagerResult<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        if instance_functions {
            env.add_filter("b64encode", b64encode);
        }

        env.add_template_owned(name.to_string(), source.to_string())?;

        Ok(Self {
            name: name.to_string(),
            env: Arc::new(env),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render one named section against `data`.
    pub fn render<S: Serialize>(&self, section: &str, data: &S) -> ManagerResult<String> {
        let mut rendered = self.render_many(&[section], data)?;
        rendered
            .pop()
            .ok_or_else(|| ManagerError::Template(format!("section {} rendered nothing", section)))
    }

    /// Render several sections in order. Output order matches `sections`.
    pub fn render_many<S: Serialize>(
        &self,
        sections: &[&str],
        data: &S,
    ) -> ManagerResult<Vec<String>> {
        let template = self.env.get_template(&self.name)?;
        let state = template.eval_to_state(context! {})?;
        let arg = Value::from_serialize(data);

        let mut rendered = Vec::with_capacity(sections.len());
        for section in sections {
            if state.lookup(section).is_none() {
                return Err(ManagerError::Template(format!(
                    "section {} is not defined in template {}",
                    section, self.name
                )));
            }

            let text = state
                .call_macro(section, std::slice::from_ref(&arg))
                .map_err(|e| {
                    ManagerError::Template(format!("{}.{}: {}", self.name, section, e))
                })?;
            rendered.push(text);
        }

        debug!(template = %self.name, sections = ?sections, "Rendered template sections");
        Ok(rendered)
    }

    /// Render sections and parse each into a manifest.
    pub fn render_manifests<S: Serialize>(
        &self,
        sections: &[&str],
        data: &S,
    ) -> ManagerResult<Vec<Manifest>> {
        let rendered = self.render_many(sections, data)?;
        Manifest::parse_all(&rendered)
    }

    pub fn render_manifest<S: Serialize>(&self, section: &str, data: &S) -> ManagerResult<Manifest> {
        Manifest::parse(&self.render(section, data)?)
    }
}

fn b64encode(value: String) -> String {
    STANDARD.encode(value)
}

/// Decoded templates for one blockchain, keyed by node type.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    instances: HashMap<InstanceType, ManifestTemplate>,
    app: Option<ManifestTemplate>,
    project: Option<ManifestTemplate>,
}

impl TemplateStore {
    /// Build the store from base64 payloads keyed by node type, "app" or
    /// "project". Any payload that fails to decode or parse fails the build.
    pub fn from_payloads(payloads: &BTreeMap<String, String>) -> ManagerResult<Self> {
        let mut store = TemplateStore::default();

        for (key, payload) in payloads {
            let bytes = STANDARD.decode(payload.trim()).map_err(|e| {
                ManagerError::Template(format!("failed to decode {} template: {}", key, e))
            })?;
            let source = String::from_utf8(bytes).map_err(|e| {
                ManagerError::Template(format!("{} template is not utf-8: {}", key, e))
            })?;

            store.insert(key, &source)?;
        }

        Ok(store)
    }

    /// Parse `source` and register it under `key`.
    pub fn insert(&mut self, key: &str, source: &str) -> ManagerResult<()> {
        match key {
            APP_TEMPLATE => self.app = Some(ManifestTemplate::new(key, source)?),
            PROJECT_TEMPLATE => self.project = Some(ManifestTemplate::new(key, source)?),
            node => match node.parse::<InstanceType>() {
                Ok(instance_type) => {
                    let template = ManifestTemplate::new_instance(node, source)?;
                    self.instances.insert(instance_type, template);
                }
                Err(_) => warn!(node = %node, "Skipping template for unsupported node type"),
            },
        }
        Ok(())
    }

    pub fn get_instance_template(&self, instance_type: InstanceType) -> ManagerResult<ManifestTemplate> {
        self.instances.get(&instance_type).cloned().ok_or_else(|| {
            ManagerError::NotFound(format!("template for instance type {}", instance_type))
        })
    }

    pub fn get_app_template(&self) -> ManagerResult<ManifestTemplate> {
        self.app
            .clone()
            .ok_or_else(|| ManagerError::NotFound("app template".to_string()))
    }

    pub fn get_project_template(&self) -> ManagerResult<ManifestTemplate> {
        self.project
            .clone()
            .ok_or_else(|| ManagerError::NotFound("project template".to_string()))
    }
}
