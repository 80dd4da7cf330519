//! Entities of the time-series demo.

use boxdb_core::{
    CoreResult, EncodeBuffer, Entity, EntityTypeId, Model, ObjectId, PropertyFlags, PropertyType,
    TableReader, TableWriter,
};

/// A named span of time, e.g. a phase of a measurement run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedTimeRange {
    /// Object id.
    pub id: ObjectId,
    /// Start, in milliseconds since the epoch.
    pub begin: i64,
    /// End, in milliseconds since the epoch.
    pub end: i64,
    /// Display name.
    pub name: String,
}

impl Entity for NamedTimeRange {
    const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(1);

    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
        let mut writer = TableWriter::new(buffer);
        writer
            .field(1, self.id)
            .field(2, self.begin)
            .field(3, self.end)
            .field(4, self.name.as_str());
        Ok(writer.finish()?)
    }

    fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
        let record = TableReader::parse(bytes)?;
        Ok(Self {
            id,
            begin: record.i64(2)?,
            end: record.i64(3)?,
            name: record.string(4)?,
        })
    }
}

/// One sample of all sensors, keyed by its timestamp.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SensorValues {
    /// Object id.
    pub id: ObjectId,
    /// Sample time, in milliseconds since the epoch.
    pub time: i64,
    pub temperature_outside: f64,
    pub temperature_inside: f64,
    pub temperature_cpu: f64,
    pub load_cpu1: f64,
    pub load_cpu2: f64,
    pub load_cpu3: f64,
    pub load_cpu4: f64,
}

impl Entity for SensorValues {
    const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(2);

    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
        let mut writer = TableWriter::new(buffer);
        writer
            .field(1, self.id)
            .field(2, self.time)
            .field(3, self.temperature_outside)
            .field(4, self.temperature_inside)
            .field(5, self.temperature_cpu)
            .field(6, self.load_cpu1)
            .field(7, self.load_cpu2)
            .field(8, self.load_cpu3)
            .field(9, self.load_cpu4);
        Ok(writer.finish()?)
    }

    fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
        let record = TableReader::parse(bytes)?;
        Ok(Self {
            id,
            time: record.i64(2)?,
            temperature_outside: record.f64(3)?,
            temperature_inside: record.f64(4)?,
            temperature_cpu: record.f64(5)?,
            load_cpu1: record.f64(6)?,
            load_cpu2: record.f64(7)?,
            load_cpu3: record.f64(8)?,
            load_cpu4: record.f64(9)?,
        })
    }
}

/// The demo schema.
pub fn model() -> Model {
    let mut model = Model::new()
        .entity("NamedTimeRange", 1)
        .property("id", 1, PropertyType::Long, PropertyFlags::ID)
        .property("begin", 2, PropertyType::Date, PropertyFlags::NONE)
        .property("end", 3, PropertyType::Date, PropertyFlags::NONE)
        .property("name", 4, PropertyType::String, PropertyFlags::NONE)
        .entity("SensorValues", 2)
        .property("id", 1, PropertyType::Long, PropertyFlags::ID)
        .property("time", 2, PropertyType::Date, PropertyFlags::ID_COMPANION);
    for (name, id) in [
        ("temperatureOutside", 3),
        ("temperatureInside", 4),
        ("temperatureCpu", 5),
        ("loadCpu1", 6),
        ("loadCpu2", 7),
        ("loadCpu3", 8),
        ("loadCpu4", 9),
    ] {
        model = model.property(name, id, PropertyType::Double, PropertyFlags::NONE);
    }
    model
}
