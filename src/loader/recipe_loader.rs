use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::api::recipe_dto::RecipeDto;
use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::recipe::{AwmTemplate, Recipe, StaticConstraint};
use crate::domain::resource::resource_path::ResourcePath;
use crate::error::{Error, Result};
use crate::loader::parser::{parse_json_file, parse_json_str};

/// The recipe loader contract: resolves a recipe name to an immutable
/// `Recipe` bound to the requesting application.
///
/// With `weak` matching, requests naming paths absent from the platform
/// are retargeted to the type-only template of the path (the closest
/// approximate match); without it they fail with `NotFound`.
pub struct RecipeLoader {
    recipe_dir: PathBuf,
    accounter: ResourceAccounter,
    cache: RwLock<HashMap<String, Arc<Recipe>>>,
}

impl RecipeLoader {
    pub fn new(recipe_dir: impl Into<PathBuf>, accounter: ResourceAccounter) -> Self {
        Self { recipe_dir: recipe_dir.into(), accounter, cache: RwLock::new(HashMap::new()) }
    }

    /// Loads `<recipe_dir>/<recipe_name>.json` for the given application.
    pub fn load(&self, app_name: &str, recipe_name: &str, weak: bool) -> Result<Arc<Recipe>> {
        let cache_key = format!("{}:{}", recipe_name, weak);
        if let Some(recipe) = self.cache.read().expect("recipe cache lock poisoned").get(&cache_key) {
            return Ok(recipe.clone());
        }

        let path = self.recipe_dir.join(format!("{}.json", recipe_name));
        let path_str = path.to_str().ok_or_else(|| Error::InvalidArgument(format!("bad recipe path for '{}'", recipe_name)))?;
        let dto: RecipeDto = parse_json_file(path_str)?;
        let recipe = Arc::new(self.build(dto, weak)?);

        log::info!("RecipeLoader: '{}' loaded for '{}' ({} working modes, weak: {})", recipe_name, app_name, recipe.working_mode_count(), weak);
        self.cache.write().expect("recipe cache lock poisoned").insert(cache_key, recipe.clone());
        Ok(recipe)
    }

    /// Builds a recipe from an in-memory JSON document; used by the tests.
    pub fn load_str(&self, data: &str, weak: bool) -> Result<Arc<Recipe>> {
        let dto: RecipeDto = parse_json_str(data)?;
        Ok(Arc::new(self.build(dto, weak)?))
    }

    fn build(&self, dto: RecipeDto, weak: bool) -> Result<Recipe> {
        let mut working_modes = Vec::with_capacity(dto.working_modes.len());
        for wm in dto.working_modes {
            let mut requests = BTreeMap::new();
            for (path_str, amount) in wm.requests {
                let path = ResourcePath::parse(&path_str).ok_or_else(|| Error::InvalidArgument(format!("recipe '{}': bad path '{}'", dto.name, path_str)))?;
                let path = self.resolve(path, weak, &dto.name)?;
                requests.insert(path, amount);
            }
            working_modes.push(AwmTemplate { id: wm.id, name: wm.name, value: wm.value, requests });
        }

        let mut constraints = BTreeMap::new();
        for c in dto.constraints {
            let path = ResourcePath::parse(&c.path).ok_or_else(|| Error::InvalidArgument(format!("recipe '{}': bad constraint path '{}'", dto.name, c.path)))?;
            constraints.insert(path, StaticConstraint { lower: c.lower, upper: c.upper });
        }

        Recipe::new(dto.name, dto.priority, working_modes, constraints, dto.plugin_data)
    }

    /// Maps a requested path onto the registered inventory.
    fn resolve(&self, path: ResourcePath, weak: bool, recipe: &str) -> Result<ResourcePath> {
        if !self.accounter.tree().find_mixed(&path).is_empty() {
            return Ok(path);
        }
        let template = path.to_template();
        if weak && self.accounter.tree().find_first(&template).is_some() {
            log::warn!("RecipeLoader: '{}' path '{}' approximated to '{}'", recipe, path, template);
            return Ok(template);
        }
        Err(Error::NotFound(format!("recipe '{}': no resource matching '{}'", recipe, path)))
    }
}
