use std::collections::BTreeMap;
use std::sync::Arc;

use funnel_core::machine::{CalculatorMachine, IntakeMachine, ScriptedMachine, StepMachine};
use funnel_core::model::ModuleId;

use crate::scripts;

/// Step-machine for every chat module.
#[derive(Clone)]
pub struct ModuleMachines {
    machines: BTreeMap<ModuleId, Arc<dyn StepMachine>>,
}

impl ModuleMachines {
    /// The production content, with `community_url` behind the VIP button.
    ///
    /// # Errors
    ///
    /// Returns `funnel_core::Error` if a content table is malformed or the
    /// community URL does not parse.
    pub fn standard(community_url: &str) -> Result<Self, funnel_core::Error> {
        let mut machines = Self::empty();
        for script in [
            scripts::module1()?,
            scripts::module2()?,
            scripts::module3()?,
            scripts::community(community_url)?,
        ] {
            machines.register(Arc::new(ScriptedMachine::new(script)?));
        }
        machines.register(Arc::new(IntakeMachine::new()));
        machines.register(Arc::new(CalculatorMachine::new()));
        Ok(machines)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            machines: BTreeMap::new(),
        }
    }

    /// Replaces any machine already registered for the same module.
    pub fn register(&mut self, machine: Arc<dyn StepMachine>) {
        self.machines.insert(machine.module(), machine);
    }

    #[must_use]
    pub fn get(&self, module: ModuleId) -> Option<Arc<dyn StepMachine>> {
        self.machines.get(&module).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripts::DEFAULT_COMMUNITY_URL;

    #[test]
    fn standard_covers_every_chat_module() {
        let machines = ModuleMachines::standard(DEFAULT_COMMUNITY_URL).unwrap();
        for module in ModuleId::CHAT {
            let machine = machines.get(module).unwrap();
            assert_eq!(machine.module(), module);
        }
        assert!(machines.get(ModuleId::Dashboard).is_none());
    }

    #[test]
    fn bad_community_url_is_rejected() {
        assert!(ModuleMachines::standard("not a url").is_err());
    }
}
