use tether_sync::SyncUnit;

/// Registered sync units in registration order, with a rotating start
/// position for dispatch rounds.
#[derive(Default)]
pub struct SyncRegistry {
    units: Vec<Box<dyn SyncUnit>>,
    cursor: usize,
}

impl SyncRegistry {
    pub fn push(&mut self, unit: Box<dyn SyncUnit>) -> usize {
        self.units.push(unit);
        self.units.len() - 1
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Units in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn SyncUnit> + '_ {
        self.units.iter().map(|u| u.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn SyncUnit + 'static)> + '_ {
        self.units.iter_mut().map(|u| u.as_mut())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn SyncUnit + 'static)> {
        self.units.get_mut(index).map(|u| u.as_mut())
    }

    /// Visit every unit once, starting at the cursor and wrapping around,
    /// then advance the cursor by one.
    pub fn round_robin(&mut self, mut visit: impl FnMut(&mut dyn SyncUnit)) {
        let len = self.units.len();
        if len == 0 {
            return;
        }
        for offset in 0..len {
            let index = (self.cursor + offset) % len;
            visit(self.units[index].as_mut());
        }
        self.cursor = (self.cursor + 1) % len;
    }
}
