use super::manifest::build_manifest;
use super::templates::{self as t, TemplateSet};
use crate::error::PipelineError;
use crate::manifest::Manifest;
use crate::metadata::view::{entity_view, module_view, procedure_view};
use crate::metadata::{EntityMetadata, ProcedureMetadata};
use crate::schema::DatabaseKind;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Package-relative path -> source text.
pub type SourceFiles = BTreeMap<String, String>;

#[derive(Clone, Debug)]
pub struct GeneratedModule {
    pub module: String,
    pub sources: SourceFiles,
    pub manifest: Manifest,
}

fn generation_error(target: &str, message: impl ToString) -> PipelineError {
    PipelineError::Generation {
        target: target.to_string(),
        message: message.to_string(),
    }
}

/// Render every file for one entity: dto, repository trait, repository, service, controller, mod.
pub fn render_entity(
    templates: &TemplateSet,
    kind: DatabaseKind,
    entity: &EntityMetadata,
    all: &[EntityMetadata],
) -> Result<Vec<(String, String)>, PipelineError> {
    let view = entity_view(kind, entity, all);
    let mut ctx = view.context.clone();

    let mut blocks: [(&'static str, &str, String); 6] = [
        ("navigation_trait_methods", t::NAV_TRAIT, String::new()),
        ("navigation_repository_methods", t::NAV_REPOSITORY, String::new()),
        ("navigation_service_trait_methods", t::NAV_SERVICE_TRAIT, String::new()),
        ("navigation_service_methods", t::NAV_SERVICE, String::new()),
        ("navigation_handlers", t::NAV_HANDLER, String::new()),
        ("navigation_routes", t::NAV_ROUTE, String::new()),
    ];
    for nav in &view.navigations {
        let nav_ctx = view.context.merged(nav);
        for (_, template, out) in blocks.iter_mut() {
            out.push_str(&templates.render(*template, &nav_ctx)?);
        }
    }
    for (key, _, out) in blocks {
        ctx.set(key, out);
    }
    let create_handler = if view.accepts_create {
        templates.render(t::ENTITY_CREATE_HANDLER, &view.context)?
    } else {
        String::new()
    };
    ctx.set("create_handler", create_handler);

    let controller = if view.is_view {
        t::ENTITY_CONTROLLER_READ_ONLY
    } else {
        t::ENTITY_CONTROLLER
    };
    let dir = format!("src/entities/{}", view.module);
    [
        ("dto.rs", t::ENTITY_DTO),
        ("repository_trait.rs", t::ENTITY_REPOSITORY_TRAIT),
        ("repository.rs", t::ENTITY_REPOSITORY),
        ("service.rs", t::ENTITY_SERVICE),
        ("controller.rs", controller),
        ("mod.rs", t::ENTITY_MOD),
    ]
    .into_iter()
    .map(|(file, id)| Ok::<_, PipelineError>((format!("{}/{}", dir, file), templates.render(id, &ctx)?)))
    .collect()
}

/// Render every file for one routine. `output.rs` exists only when the routine returns rows.
pub fn render_procedure(
    templates: &TemplateSet,
    kind: DatabaseKind,
    procedure: &ProcedureMetadata,
) -> Result<Vec<(String, String)>, PipelineError> {
    let view = procedure_view(kind, procedure);
    let dir = format!("src/procedures/{}", view.module);
    let mut files = vec![("input.rs", t::PROCEDURE_INPUT), ("mod.rs", t::PROCEDURE_MOD)];
    if view.has_output {
        files.extend([
            ("output.rs", t::PROCEDURE_OUTPUT),
            ("repository.rs", t::PROCEDURE_REPOSITORY),
            ("service.rs", t::PROCEDURE_SERVICE),
            ("controller.rs", t::PROCEDURE_CONTROLLER),
        ]);
    } else {
        files.extend([
            ("repository.rs", t::PROCEDURE_REPOSITORY_NO_OUTPUT),
            ("service.rs", t::PROCEDURE_SERVICE_NO_OUTPUT),
            ("controller.rs", t::PROCEDURE_CONTROLLER_NO_OUTPUT),
        ]);
    }
    files
        .into_iter()
        .map(|(file, id)| Ok::<_, PipelineError>((format!("{}/{}", dir, file), templates.render(id, &view.context)?)))
        .collect()
}

fn store(files: &Mutex<SourceFiles>, rendered: Vec<(String, String)>) -> Result<(), PipelineError> {
    let mut guard = files
        .lock()
        .map_err(|_| generation_error("sources", "source map lock poisoned"))?;
    guard.extend(rendered);
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct Generator {
    templates: Arc<TemplateSet>,
}

impl Generator {
    pub fn new(templates: TemplateSet) -> Self {
        Generator {
            templates: Arc::new(templates),
        }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Render the whole module. Entities and procedures render as independent tasks; mapping
    /// (including foreign-key linking) must be complete before this is called.
    pub async fn generate(
        &self,
        module: &str,
        kind: DatabaseKind,
        entities: Vec<EntityMetadata>,
        procedures: Vec<ProcedureMetadata>,
    ) -> Result<GeneratedModule, PipelineError> {
        let files: Arc<Mutex<SourceFiles>> = Arc::new(Mutex::new(BTreeMap::new()));
        let entities = Arc::new(entities);
        let procedures = Arc::new(procedures);
        let mut tasks = JoinSet::new();

        for index in 0..entities.len() {
            let (templates, entities, files) = (self.templates.clone(), entities.clone(), files.clone());
            tasks.spawn(async move {
                let rendered = render_entity(&templates, kind, &entities[index], &entities)?;
                store(&files, rendered)
            });
        }
        for index in 0..procedures.len() {
            let (templates, procedures, files) = (self.templates.clone(), procedures.clone(), files.clone());
            tasks.spawn(async move {
                let rendered = render_procedure(&templates, kind, &procedures[index])?;
                store(&files, rendered)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| generation_error("task", e))??;
        }

        let manifest = build_manifest(module, kind, &entities, &procedures);
        let manifest_json = serde_json::to_string_pretty(&manifest).map_err(|e| generation_error("manifest", e))?;
        let ctx = module_view(kind, module, &entities, &procedures, &manifest_json);
        let shared = [
            ("src/main.rs", t::MAIN),
            ("src/context.rs", t::CONTEXT),
            ("src/registration.rs", t::REGISTRATION),
            ("src/entities/mod.rs", t::ENTITIES_MOD),
            ("src/procedures/mod.rs", t::PROCEDURES_MOD),
        ];
        let mut rendered = Vec::with_capacity(shared.len());
        for (path, id) in shared {
            rendered.push((path.to_string(), self.templates.render(id, &ctx)?));
        }
        store(&files, rendered)?;

        let sources = {
            let mut guard = files
                .lock()
                .map_err(|_| generation_error("sources", "source map lock poisoned"))?;
            std::mem::take(&mut *guard)
        };
        tracing::info!(
            module = %module,
            entities = entities.len(),
            procedures = procedures.len(),
            files = sources.len(),
            "module source generated"
        );
        Ok(GeneratedModule {
            module: module.to_string(),
            sources,
            manifest,
        })
    }
}
