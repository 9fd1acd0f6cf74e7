//! People feature: maps user intents onto store writes.
//!
//! Each operation is exactly one [`AccessCoordinator::write`]. The bound
//! people list trails the store by one dispatch, so writes never take row
//! contents from it; they re-read inside their own transaction.

use crate::error::{Error, Result};
use crate::model::{IdentifiedVec, Person};
use crate::observation::{ObservationBridge, PeopleQuery, SharedReader};
use crate::storage::record::{self, Record};
use crate::storage::AccessCoordinator;
use tracing::info;

/// User intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddPerson(Person),
    PersonDeleted(i64),
    UpdatePersonAge(i64, i64),
}

/// Insert a person; returns it with its assigned identity.
///
/// # Errors
///
/// Returns [`Error::IdentityAssigned`] for a person that already has an ID,
/// or a database error.
pub fn insert_person(coordinator: &AccessCoordinator, mut person: Person) -> Result<Person> {
    coordinator.write("insert_person", |tx, ctx| {
        let id = record::insert(tx, &mut person)?;
        ctx.record_change(Person::TABLE, id);
        Ok(())
    })?;
    Ok(person)
}

/// Overwrite a stored person.
///
/// # Errors
///
/// Returns [`Error::MissingIdentity`] or [`Error::NotFound`]; storage is unchanged.
pub fn update_person(coordinator: &AccessCoordinator, person: &Person) -> Result<()> {
    coordinator.write("update_person", |tx, ctx| {
        record::update(tx, person)?;
        if let Some(id) = person.id {
            ctx.record_change(Person::TABLE, id);
        }
        Ok(())
    })
}

/// Set a stored person's age, leaving every other column as stored.
///
/// The row is read and rewritten inside one write, so a concurrent change to
/// another column is never reverted.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no such person is stored.
pub fn set_person_age(coordinator: &AccessCoordinator, id: i64, age: i64) -> Result<Person> {
    coordinator.write("set_person_age", |tx, ctx| {
        let mut person: Person = record::fetch_one(tx, id)?.ok_or(Error::NotFound {
            table: Person::TABLE,
            id,
        })?;
        person.age = age;
        record::update(tx, &person)?;
        ctx.record_change(Person::TABLE, id);
        Ok(person)
    })
}

/// Delete a person by identity.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no such person is stored.
pub fn delete_person(coordinator: &AccessCoordinator, id: i64) -> Result<()> {
    coordinator.write("delete_person", |tx, ctx| {
        record::delete::<Person>(tx, id)?;
        ctx.record_change(Person::TABLE, id);
        Ok(())
    })
}

/// The people list plus the operations that change it.
pub struct Feature {
    coordinator: AccessCoordinator,
    people: SharedReader<PeopleQuery>,
}

impl Feature {
    /// Bind the full people list to `coordinator`.
    #[must_use]
    pub fn new(coordinator: AccessCoordinator) -> Self {
        let people = ObservationBridge::new(coordinator.clone(), PeopleQuery::All)
            .bind(IdentifiedVec::default());
        Self {
            coordinator,
            people,
        }
    }

    /// Current people, as last delivered by the subscription.
    #[must_use]
    pub fn people(&self) -> IdentifiedVec<Person> {
        self.people.get()
    }

    #[must_use]
    pub fn state(&self) -> &SharedReader<PeopleQuery> {
        &self.people
    }

    /// Apply an intent. Returns the affected person's identity.
    ///
    /// # Errors
    ///
    /// Surfaces every storage failure; `UpdatePersonAge` and `PersonDeleted`
    /// fail with [`Error::NotFound`] when the person is not stored.
    pub fn send(&self, action: Action) -> Result<i64> {
        match action {
            Action::AddPerson(person) => {
                let person = insert_person(&self.coordinator, person)?;
                let id = person.id.ok_or(Error::MissingIdentity { table: Person::TABLE })?;
                info!(id, name = %person.name, "Person added");
                Ok(id)
            }
            Action::UpdatePersonAge(id, age) => {
                set_person_age(&self.coordinator, id, age)?;
                info!(id, age, "Person age updated");
                Ok(id)
            }
            Action::PersonDeleted(id) => {
                delete_person(&self.coordinator, id)?;
                info!(id, "Person deleted");
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::House;
    use crate::storage::schema::default_registry;
    use crate::storage::{ChangeEpoch, ChangeObserver};
    use std::sync::{Arc, Mutex, Weak};
    use std::time::Duration;

    fn feature() -> (AccessCoordinator, Feature) {
        let coord = AccessCoordinator::open_memory(&default_registry()).unwrap();
        let feature = Feature::new(coord.clone());
        (coord, feature)
    }

    /// Holds up the dispatcher so bound state lags the store.
    struct Sluggish;

    impl ChangeObserver for Sluggish {
        fn on_change(&self, _epoch: &ChangeEpoch) {
            std::thread::sleep(Duration::from_millis(200));
        }
    }

    fn lagging_feature() -> (AccessCoordinator, Feature, Arc<Sluggish>) {
        let coord = AccessCoordinator::open_memory(&default_registry()).unwrap();
        let sluggish = Arc::new(Sluggish);
        coord.observe(Arc::downgrade(&sluggish) as Weak<dyn ChangeObserver>);
        let feature = Feature::new(coord.clone());
        (coord, feature, sluggish)
    }

    fn stored(coord: &AccessCoordinator, id: i64) -> Person {
        coord
            .read(|conn| record::fetch_one::<Person>(conn, id))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_update_right_after_insert() {
        let (coord, feature, _sluggish) = lagging_feature();

        let id = feature.send(Action::AddPerson(Person::new("Harry", 30))).unwrap();
        feature.send(Action::UpdatePersonAge(id, 31)).unwrap();

        assert_eq!(stored(&coord, id).age, 31);
    }

    #[test]
    fn test_update_age_keeps_other_columns() {
        let (coord, feature, _sluggish) = lagging_feature();
        let id = feature.send(Action::AddPerson(Person::new("Harry", 30))).unwrap();
        coord.flush_notifications();

        coord
            .write("sort", |tx, _ctx| {
                let mut person: Person = record::fetch_one(tx, id)?.unwrap();
                person.house = House::Slytherin;
                record::update(tx, &person)
            })
            .unwrap();
        feature.send(Action::UpdatePersonAge(id, 31)).unwrap();

        let person = stored(&coord, id);
        assert_eq!(person.age, 31);
        assert_eq!(person.house, House::Slytherin);
    }

    #[test]
    fn test_set_person_age_returns_stored_row() {
        let (coord, _feature) = feature();
        let harry = insert_person(&coord, Person::new("Harry", 30).with_house(House::Hufflepuff)).unwrap();
        let id = harry.id.unwrap();

        let updated = set_person_age(&coord, id, 40).unwrap();
        assert_eq!(updated.house, House::Hufflepuff);
        assert_eq!(updated, stored(&coord, id));

        let err = set_person_age(&coord, id + 1, 40).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_insert_update_delete_scenario() {
        let (coord, feature) = feature();
        let bridge = ObservationBridge::new(coord.clone(), PeopleQuery::All);
        let seen: Arc<Mutex<Vec<IdentifiedVec<Person>>>> = Arc::default();
        let sink = Arc::clone(&seen);

        let id = feature.send(Action::AddPerson(Person::new("Harry", 30))).unwrap();
        coord.flush_notifications();
        assert_eq!(
            bridge.load(IdentifiedVec::default()).into_vec(),
            vec![Person {
                id: Some(id),
                name: "Harry".to_string(),
                age: 30,
                house: crate::model::House::Gryffindor,
            }]
        );

        let _sub = bridge.subscribe(bridge.load(IdentifiedVec::default()), move |v| {
            sink.lock().unwrap().push(v);
        });

        feature.send(Action::UpdatePersonAge(id, 31)).unwrap();
        coord.flush_notifications();
        assert_eq!(bridge.load(IdentifiedVec::default()).get(id).unwrap().age, 31);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(feature.people().get(id).unwrap().age, 31);

        feature.send(Action::PersonDeleted(id)).unwrap();
        coord.flush_notifications();
        assert!(bridge.load(IdentifiedVec::default()).is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].is_empty());
    }

    #[test]
    fn test_update_unknown_person() {
        let (coord, feature) = feature();
        let before = coord.epoch();

        let err = feature.send(Action::UpdatePersonAge(99, 31)).unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 99, .. }));

        let mut ghost = Person::new("Ghost", 1);
        ghost.id = Some(99);
        let err = update_person(&coord, &ghost).unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 99, .. }));

        assert_eq!(coord.epoch(), before);
        assert!(feature.people().is_empty());
    }

    #[test]
    fn test_delete_unknown_person() {
        let (_coord, feature) = feature();
        let err = feature.send(Action::PersonDeleted(5)).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_sequence_matches_model() {
        let (coord, feature) = feature();
        let mut model: Vec<(i64, i64)> = Vec::new();

        for i in 0..10 {
            let id = feature.send(Action::AddPerson(Person::new(format!("p{i}"), i))).unwrap();
            model.push((id, i));
        }
        coord.flush_notifications();
        for (id, age) in model.iter_mut().filter(|(id, _)| id % 2 == 0) {
            feature.send(Action::UpdatePersonAge(*id, 100)).unwrap();
            *age = 100;
        }
        for id in model.iter().filter(|(id, _)| id % 3 == 0).map(|(id, _)| *id).collect::<Vec<_>>() {
            feature.send(Action::PersonDeleted(id)).unwrap();
            model.retain(|(m, _)| *m != id);
        }
        coord.flush_notifications();

        let stored: Vec<(i64, i64)> = feature
            .people()
            .iter()
            .map(|p| (p.id.unwrap(), p.age))
            .collect();
        assert_eq!(stored, model);
    }
}
