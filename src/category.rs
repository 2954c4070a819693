use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Category {
    Tenant,
    LimitDefinition,
    ConsolePropertyDefinition,
    PropertyDefinition,
    LimitTenancyOverride,
    ConsolePropertyTenancyOverride,
    PropertyTenancyOverride,
    LimitRegionalOverride,
    ConsolePropertyRegionalOverride,
    PropertyRegionalOverride,
    BaseModel,
    ModelArtifact,
    Environment,
    ServiceTenancy,
    GpuPool,
    GpuNode,
    DedicatedAICluster,
    Alias,
}

/// Mutating operations a category exposes on its rows.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ItemAction {
    Delete,
    Cordon,
    Drain,
    Reboot,
    ScaleUp,
    ScaleDown,
}

impl ItemAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Cordon => "cordon",
            Self::Drain => "drain",
            Self::Reboot => "reboot",
            Self::ScaleUp => "scale up",
            Self::ScaleDown => "scale down",
        }
    }

    pub fn needs_confirmation(self) -> bool {
        matches!(self, Self::Delete | Self::Drain | Self::Reboot)
    }
}

impl Category {
    /// Navigable categories, in next/prev order. `Alias` is reachable only by name.
    pub const ALL: [Self; 17] = [
        Self::Tenant,
        Self::LimitDefinition,
        Self::ConsolePropertyDefinition,
        Self::PropertyDefinition,
        Self::LimitTenancyOverride,
        Self::ConsolePropertyTenancyOverride,
        Self::PropertyTenancyOverride,
        Self::LimitRegionalOverride,
        Self::ConsolePropertyRegionalOverride,
        Self::PropertyRegionalOverride,
        Self::BaseModel,
        Self::ModelArtifact,
        Self::Environment,
        Self::ServiceTenancy,
        Self::GpuPool,
        Self::GpuNode,
        Self::DedicatedAICluster,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Tenant => "Tenant",
            Self::LimitDefinition => "LimitDefinition",
            Self::ConsolePropertyDefinition => "ConsolePropertyDefinition",
            Self::PropertyDefinition => "PropertyDefinition",
            Self::LimitTenancyOverride => "LimitTenancyOverride",
            Self::ConsolePropertyTenancyOverride => "ConsolePropertyTenancyOverride",
            Self::PropertyTenancyOverride => "PropertyTenancyOverride",
            Self::LimitRegionalOverride => "LimitRegionalOverride",
            Self::ConsolePropertyRegionalOverride => "ConsolePropertyRegionalOverride",
            Self::PropertyRegionalOverride => "PropertyRegionalOverride",
            Self::BaseModel => "BaseModel",
            Self::ModelArtifact => "ModelArtifact",
            Self::Environment => "Environment",
            Self::ServiceTenancy => "ServiceTenancy",
            Self::GpuPool => "GpuPool",
            Self::GpuNode => "GpuNode",
            Self::DedicatedAICluster => "DedicatedAICluster",
            Self::Alias => "Alias",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Tenant => &["t", "tenant", "tenants"],
            Self::LimitDefinition => &["ld", "limitdef", "limitdefinition"],
            Self::ConsolePropertyDefinition => {
                &["cpd", "consolepropdef", "consolepropertydefinition"]
            }
            Self::PropertyDefinition => &["pd", "propdef", "propertydefinition"],
            Self::LimitTenancyOverride => &["lto", "limittenancyoverride"],
            Self::ConsolePropertyTenancyOverride => &["cpto", "consolepropertytenancyoverride"],
            Self::PropertyTenancyOverride => &["pto", "propertytenancyoverride"],
            Self::LimitRegionalOverride => &["lro", "limitregionaloverride"],
            Self::ConsolePropertyRegionalOverride => {
                &["cpro", "consolepropertyregionaloverride"]
            }
            Self::PropertyRegionalOverride => &["pro", "propertyregionaloverride"],
            Self::BaseModel => &["bm", "model", "basemodel"],
            Self::ModelArtifact => &["ma", "artifact", "modelartifact"],
            Self::Environment => &["e", "env", "environment"],
            Self::ServiceTenancy => &["st", "tenancy", "servicetenancy"],
            Self::GpuPool => &["gp", "pool", "gpupool"],
            Self::GpuNode => &["gn", "node", "gpunode"],
            Self::DedicatedAICluster => &["dac", "cluster", "dedicatedaicluster"],
            Self::Alias => &["a", "alias"],
        }
    }

    pub fn parse(token: &str) -> Result<Self, UnknownCategory> {
        let token = token.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .chain(std::iter::once(&Self::Alias))
            .copied()
            .find(|category| category.aliases().contains(&token.as_str()))
            .ok_or(UnknownCategory(token))
    }

    /// Every alias of every category, sorted, for completion.
    pub fn all_aliases() -> Vec<&'static str> {
        let mut aliases = Self::ALL
            .iter()
            .chain(std::iter::once(&Self::Alias))
            .flat_map(|category| category.aliases().iter().copied())
            .collect::<Vec<_>>();
        aliases.sort_unstable();
        aliases
    }

    pub fn scoped_categories(self) -> &'static [Category] {
        match self {
            Self::Tenant => &[
                Self::LimitTenancyOverride,
                Self::ConsolePropertyTenancyOverride,
                Self::PropertyTenancyOverride,
                Self::DedicatedAICluster,
            ],
            Self::LimitDefinition => &[Self::LimitTenancyOverride, Self::LimitRegionalOverride],
            Self::ConsolePropertyDefinition => &[
                Self::ConsolePropertyTenancyOverride,
                Self::ConsolePropertyRegionalOverride,
            ],
            Self::PropertyDefinition => &[
                Self::PropertyTenancyOverride,
                Self::PropertyRegionalOverride,
            ],
            Self::GpuPool => &[Self::GpuNode],
            _ => &[],
        }
    }

    pub fn is_scope(self) -> bool {
        !self.scoped_categories().is_empty()
    }

    pub fn is_scope_of(self, other: Category) -> bool {
        self.scoped_categories().contains(&other)
    }

    pub fn definition(self) -> Option<Category> {
        match self {
            Self::LimitTenancyOverride | Self::LimitRegionalOverride => {
                Some(Self::LimitDefinition)
            }
            Self::ConsolePropertyTenancyOverride | Self::ConsolePropertyRegionalOverride => {
                Some(Self::ConsolePropertyDefinition)
            }
            Self::PropertyTenancyOverride | Self::PropertyRegionalOverride => {
                Some(Self::PropertyDefinition)
            }
            _ => None,
        }
    }

    /// Categories whose rows are keyed by `(bucket, name)` instead of a bare name.
    pub fn is_scoped_key(self) -> bool {
        matches!(
            self,
            Self::LimitTenancyOverride
                | Self::ConsolePropertyTenancyOverride
                | Self::PropertyTenancyOverride
                | Self::GpuNode
                | Self::DedicatedAICluster
        )
    }

    pub fn actions(self) -> &'static [ItemAction] {
        match self {
            Self::GpuNode => &[ItemAction::Cordon, ItemAction::Drain, ItemAction::Reboot],
            Self::DedicatedAICluster => &[ItemAction::Delete],
            Self::GpuPool => &[ItemAction::ScaleUp, ItemAction::ScaleDown],
            _ => &[],
        }
    }

    pub fn supports(self, action: ItemAction) -> bool {
        self.actions().contains(&action)
    }

    /// Position in the navigation ring, `None` for `Alias`.
    pub fn index(self) -> Option<usize> {
        Self::ALL.iter().position(|category| *category == self)
    }

    pub fn offset(self, delta: isize) -> Category {
        let len = Self::ALL.len() as isize;
        let current = self.index().unwrap_or(0) as isize;
        Self::ALL[(current + delta).rem_euclid(len) as usize]
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}
