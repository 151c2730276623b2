//! Built-in systems.

use std::io::Write;

use tracing::warn;

use crate::{
    component::{ComponentMask, ComponentStore},
    ecs::System,
};

/// Writes the name of every named entity, in id order, once per tick.
pub struct NameReader<W> {
    out: W,
}

impl<W: Write + Send> NameReader<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> System for NameReader<W> {
    fn update(&mut self, components: &mut ComponentStore) {
        for id in components.entities_with(ComponentMask::NAME) {
            let Some(name) = components.name(id) else {
                continue;
            };
            if let Err(e) = self.out.write_all(name.0.as_bytes()) {
                warn!(entity = id.0, error = %e, "NameReader write failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::component::Name;
    use crate::ecs::World;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn name_reader_skips_unnamed_entities() {
        let mut world = World::new();
        for i in 0..5 {
            let e = world.add_entity();
            world.add_or_update_component(e, Name(i.to_string())).unwrap();
            world.add_entity();
        }

        let buf = SharedBuf::default();
        world.add_system(NameReader::new(buf.clone()));
        world.update();

        assert_eq!(buf.contents(), "01234");
    }

    #[test]
    fn name_reader_ignores_removed_names() {
        let mut world = World::new();
        let a = world.add_entity();
        let b = world.add_entity();
        world.add_or_update_component(a, Name("alpha".into())).unwrap();
        world.add_or_update_component(b, Name("beta".into())).unwrap();
        world.remove_component(a, ComponentMask::NAME).unwrap();

        let buf = SharedBuf::default();
        world.add_system(NameReader::new(buf.clone()));
        world.update();

        assert_eq!(buf.contents(), "beta");
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_does_not_stop_other_systems() {
        let mut world = World::new();
        let e = world.add_entity();
        world.add_or_update_component(e, Name("x".into())).unwrap();

        let buf = SharedBuf::default();
        world.add_system(NameReader::new(Broken));
        world.add_system(NameReader::new(buf.clone()));
        world.update();

        assert_eq!(buf.contents(), "x");
    }
}
