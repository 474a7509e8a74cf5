use crate::chain::Chain;
use crate::mapping::FlatMapping;
use crate::registry::{ChainRef, MappingId, Registry, Role};
use crate::schema::ModelId;
use crate::{info, AppError};
use std::collections::HashSet;

struct Compiled {
    target: String,
    sync_flag: Option<String>,
    chain: Chain,
}

/// Builds every chain first so a bad declaration leaves the registry untouched, then
/// registers each mapping on the depender, the dependee and every model in between.
pub fn compile(registry: &mut Registry, model: ModelId, mappings: &[FlatMapping]) -> Result<Vec<MappingId>, AppError> {
    let schema = registry.schema().clone();
    let depender = schema.model(model);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut compiled = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let chain = Chain::build(&schema, model, mapping.path.as_slice())?;
        if !depender.has_column(&mapping.target) {
            return Err(AppError::UnknownColumn { model: depender.name.clone(), column: mapping.target.clone() });
        }
        if registry.mapping_entry(model, &mapping.target).is_some() || !seen.insert(mapping.target.as_str()) {
            return Err(AppError::DuplicateTargetColumn { model: depender.name.clone(), column: mapping.target.clone() });
        }
        let flag = format!("{}{}", mapping.target, registry.sync_flag_suffix());
        let sync_flag = depender.has_column(&flag).then_some(flag);
        compiled.push(Compiled { target: mapping.target.clone(), sync_flag, chain });
    }

    let mut ids = Vec::with_capacity(compiled.len());
    for Compiled { target, sync_flag, chain } in compiled {
        let path = chain.path();
        let hops = chain.hops();
        let dependee = chain.dependee();
        let intermediaries: Vec<(usize, ModelId)> =
            chain.intermediary_positions().map(|p| (p, chain.node(p).model)).collect();

        let id = registry.push_entry(model, target.clone(), sync_flag, chain);
        registry.bind_target(model, &target, id);
        registry.register(model, Role::Depender, ChainRef { mapping: id, position: 0 });
        // a direct column has no other record to propagate to
        if hops > 0 {
            registry.register(dependee, Role::Dependee, ChainRef { mapping: id, position: hops });
            for (position, intermediary) in intermediaries {
                registry.register(intermediary, Role::Intermediary, ChainRef { mapping: id, position });
            }
        }
        info!("Mapped {}.{} <- {}", depender.name, target, path);
        ids.push(id);
    }
    Ok(ids)
}
