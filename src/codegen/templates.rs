//! The fixed template set, keyed by generation target.

use super::template::Template;
use crate::error::PipelineError;
use crate::metadata::view::ViewModel;
use std::collections::BTreeMap;

pub const ENTITY_DTO: &str = "entity_dto";
pub const ENTITY_REPOSITORY_TRAIT: &str = "entity_repository_trait";
pub const ENTITY_REPOSITORY: &str = "entity_repository";
pub const ENTITY_SERVICE: &str = "entity_service";
pub const ENTITY_CONTROLLER: &str = "entity_controller";
pub const ENTITY_CONTROLLER_READ_ONLY: &str = "entity_controller_read_only";
pub const ENTITY_CREATE_HANDLER: &str = "entity_create_handler";
pub const ENTITY_MOD: &str = "entity_mod";
pub const NAV_TRAIT: &str = "nav_trait";
pub const NAV_REPOSITORY: &str = "nav_repository";
pub const NAV_SERVICE_TRAIT: &str = "nav_service_trait";
pub const NAV_SERVICE: &str = "nav_service";
pub const NAV_HANDLER: &str = "nav_handler";
pub const NAV_ROUTE: &str = "nav_route";
pub const PROCEDURE_INPUT: &str = "procedure_input";
pub const PROCEDURE_OUTPUT: &str = "procedure_output";
pub const PROCEDURE_REPOSITORY: &str = "procedure_repository";
pub const PROCEDURE_REPOSITORY_NO_OUTPUT: &str = "procedure_repository_no_output";
pub const PROCEDURE_SERVICE: &str = "procedure_service";
pub const PROCEDURE_SERVICE_NO_OUTPUT: &str = "procedure_service_no_output";
pub const PROCEDURE_CONTROLLER: &str = "procedure_controller";
pub const PROCEDURE_CONTROLLER_NO_OUTPUT: &str = "procedure_controller_no_output";
pub const PROCEDURE_MOD: &str = "procedure_mod";
pub const CONTEXT: &str = "context";
pub const REGISTRATION: &str = "registration";
pub const MAIN: &str = "main";
pub const ENTITIES_MOD: &str = "entities_mod";
pub const PROCEDURES_MOD: &str = "procedures_mod";

const BUILTIN: &[(&str, &str)] = &[
    (ENTITY_DTO, include_str!("templates/entity_dto.tpl")),
    (ENTITY_REPOSITORY_TRAIT, include_str!("templates/entity_repository_trait.tpl")),
    (ENTITY_REPOSITORY, include_str!("templates/entity_repository.tpl")),
    (ENTITY_SERVICE, include_str!("templates/entity_service.tpl")),
    (ENTITY_CONTROLLER, include_str!("templates/entity_controller.tpl")),
    (ENTITY_CONTROLLER_READ_ONLY, include_str!("templates/entity_controller_read_only.tpl")),
    (ENTITY_CREATE_HANDLER, include_str!("templates/entity_create_handler.tpl")),
    (ENTITY_MOD, include_str!("templates/entity_mod.tpl")),
    (NAV_TRAIT, include_str!("templates/nav_trait.tpl")),
    (NAV_REPOSITORY, include_str!("templates/nav_repository.tpl")),
    (NAV_SERVICE_TRAIT, include_str!("templates/nav_service_trait.tpl")),
    (NAV_SERVICE, include_str!("templates/nav_service.tpl")),
    (NAV_HANDLER, include_str!("templates/nav_handler.tpl")),
    (NAV_ROUTE, include_str!("templates/nav_route.tpl")),
    (PROCEDURE_INPUT, include_str!("templates/procedure_input.tpl")),
    (PROCEDURE_OUTPUT, include_str!("templates/procedure_output.tpl")),
    (PROCEDURE_REPOSITORY, include_str!("templates/procedure_repository.tpl")),
    (PROCEDURE_REPOSITORY_NO_OUTPUT, include_str!("templates/procedure_repository_no_output.tpl")),
    (PROCEDURE_SERVICE, include_str!("templates/procedure_service.tpl")),
    (PROCEDURE_SERVICE_NO_OUTPUT, include_str!("templates/procedure_service_no_output.tpl")),
    (PROCEDURE_CONTROLLER, include_str!("templates/procedure_controller.tpl")),
    (PROCEDURE_CONTROLLER_NO_OUTPUT, include_str!("templates/procedure_controller_no_output.tpl")),
    (PROCEDURE_MOD, include_str!("templates/procedure_mod.tpl")),
    (CONTEXT, include_str!("templates/context.tpl")),
    (REGISTRATION, include_str!("templates/registration.tpl")),
    (MAIN, include_str!("templates/main.tpl")),
    (ENTITIES_MOD, include_str!("templates/entities_mod.tpl")),
    (PROCEDURES_MOD, include_str!("templates/procedures_mod.tpl")),
];

#[derive(Clone, Debug)]
pub struct TemplateSet {
    templates: BTreeMap<&'static str, Template>,
}

impl TemplateSet {
    pub fn builtin() -> Self {
        let templates = BUILTIN
            .iter()
            .map(|(id, text)| (*id, Template::parse(text)))
            .collect();
        TemplateSet { templates }
    }

    /// Replace one template. Only ids of the built-in set are accepted.
    pub fn with_override(mut self, id: &str, text: &str) -> Result<Self, PipelineError> {
        let Some((key, _)) = BUILTIN.iter().find(|(k, _)| *k == id) else {
            return Err(PipelineError::Generation {
                target: id.to_string(),
                message: "unknown template id".to_string(),
            });
        };
        self.templates.insert(key, Template::parse(text));
        Ok(self)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.templates.keys().copied()
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// Render one template against a view model.
    pub fn render(&self, id: &str, ctx: &ViewModel) -> Result<String, PipelineError> {
        self.get(id)
            .map(|t| t.render(ctx))
            .ok_or_else(|| PipelineError::Generation {
                target: id.to_string(),
                message: "template not found".to_string(),
            })
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::builtin()
    }
}
