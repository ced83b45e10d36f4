#![forbid(unsafe_code)]
use super::{canonical, ColumnToAccessorMap, OnceMap};
use crate::{
    data::{ColumnValueConverter, DataType, Value},
    error::{ConfigError, MaterializeError, Result},
    object::{Constructor, Object},
    storage::{RowCursor, RowShape},
};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::debug;

////////////////////////////////////////////////////////////////////////////////

/// Turns query rows into instances of `T`.
///
/// The strategy is picked once per type: a designated constructor if the
/// type declares one, otherwise zero-argument construction followed by one
/// setter call per mapped column. Metadata derived from a row shape is
/// computed on first sight of that shape and reused afterwards.
pub struct ColumnsMapping<T> {
    columns: Arc<ColumnToAccessorMap<T>>,
    converter: Arc<dyn ColumnValueConverter>,
    strategy: Strategy<T>,
    resolutions: AtomicUsize,
}

enum Strategy<T> {
    Constructor(ConstructorStrategy<T>),
    Setter(SetterStrategy<T>),
}

impl<T: Object> ColumnsMapping<T> {
    pub fn new(
        columns: Arc<ColumnToAccessorMap<T>>,
        converter: Arc<dyn ColumnValueConverter>,
    ) -> Result<Self> {
        let mut constructors = T::constructors();
        let instantiable = T::instantiate().is_some();

        let strategy = match constructors.len() {
            0 if instantiable => Strategy::Setter(SetterStrategy::new()),
            0 => {
                return Err(ConfigError::NoConstructor {
                    type_name: T::TYPE_NAME,
                }
                .into())
            }
            1 => {
                let constructor = constructors.remove(0);
                Strategy::Constructor(ConstructorStrategy::new(
                    constructor,
                    columns.alias_prefix(),
                    instantiable.then(SetterStrategy::new),
                ))
            }
            count => {
                return Err(ConfigError::AmbiguousConstructor {
                    type_name: T::TYPE_NAME,
                    count,
                }
                .into())
            }
        };

        let mapping = Self {
            columns,
            converter,
            strategy,
            resolutions: AtomicUsize::new(0),
        };
        debug!(type_name = T::TYPE_NAME, strategy = mapping.strategy_name(), "built columns mapping");
        Ok(mapping)
    }

    /// Reads the next row of `cursor`, `None` once it is exhausted.
    pub fn materialize(&self, cursor: &mut dyn RowCursor) -> Result<Option<T>> {
        match cursor.next_row()? {
            Some(row) => {
                let shape = cursor.shape().clone();
                self.materialize_row(&shape, row).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Drains `cursor`.
    pub fn materialize_all(&self, cursor: &mut dyn RowCursor) -> Result<Vec<T>> {
        let shape = cursor.shape().clone();
        let mut objects = Vec::new();
        while let Some(row) = cursor.next_row()? {
            objects.push(self.materialize_row(&shape, row)?);
        }
        Ok(objects)
    }

    pub fn materialize_row(&self, shape: &RowShape, row: Vec<Value>) -> Result<T> {
        match &self.strategy {
            Strategy::Setter(setter) => setter.create(self, shape, row),
            Strategy::Constructor(ctor) => {
                let retry = ctor.fallback.as_ref().map(|_| row.clone());
                match ctor.create(self, shape, row) {
                    Ok(object) => Ok(object),
                    Err(err) => match (&ctor.fallback, retry) {
                        (Some(setter), Some(row)) => {
                            debug!(
                                type_name = T::TYPE_NAME,
                                error = %err,
                                "constructor materialization failed, retrying with setters"
                            );
                            setter.create(self, shape, row)
                        }
                        _ => Err(err.into()),
                    },
                }
            }
        }
    }
}

impl<T> ColumnsMapping<T> {
    pub fn columns(&self) -> &ColumnToAccessorMap<T> {
        &self.columns
    }

    /// Number of column lookups performed while deriving row-shape metadata.
    pub fn shape_resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn cached_shapes(&self) -> usize {
        match &self.strategy {
            Strategy::Constructor(ctor) => {
                ctor.shapes.len() + ctor.fallback.as_ref().map_or(0, |s| s.shapes.len())
            }
            Strategy::Setter(setter) => setter.shapes.len(),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self.strategy {
            Strategy::Constructor(_) => "constructor",
            Strategy::Setter(_) => "setter",
        }
    }

    fn convert(&self, column: &str, value: Value, target: DataType) -> Result<Value, MaterializeError> {
        self.converter
            .convert(value, target)
            .map_err(|err| MaterializeError::new(self.columns.type_name(), column, err))
    }
}

impl<T> fmt::Display for ColumnsMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] instances are created by the {} strategy",
            self.columns.type_name(),
            self.strategy_name()
        )?;
        if let Strategy::Constructor(ctor) = &self.strategy {
            write!(f, " with {}", ctor.constructor)?;
        }
        write!(f, "\n{}", self.columns)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug)]
struct ParameterSlot {
    ordinal: usize,
    data_type: DataType,
}

struct ConstructorStrategy<T> {
    constructor: Constructor<T>,
    parameters: HashMap<String, ParameterSlot>,
    shapes: OnceMap<RowShape, Arc<[Option<ParameterSlot>]>>,
    fallback: Option<SetterStrategy<T>>,
}

impl<T> ConstructorStrategy<T> {
    fn new(
        constructor: Constructor<T>,
        alias_prefix: Option<&str>,
        fallback: Option<SetterStrategy<T>>,
    ) -> Self {
        let mut parameters = HashMap::new();
        for (ordinal, param) in constructor.parameters().iter().enumerate() {
            let slot = ParameterSlot {
                ordinal,
                data_type: param.data_type,
            };
            parameters.insert(canonical(param.name), slot);
            if let Some(prefix) = alias_prefix {
                parameters
                    .entry(canonical(&format!("{}{}", prefix, param.name)))
                    .or_insert(slot);
            }
        }

        Self {
            constructor,
            parameters,
            shapes: OnceMap::new(),
            fallback,
        }
    }

    /// Column position to constructor slot, `None` for unmatched columns.
    fn slots(&self, owner: &ColumnsMapping<T>, shape: &RowShape) -> Arc<[Option<ParameterSlot>]> {
        let computed = self.shapes.get_or_try_init(shape, || {
            owner.resolutions.fetch_add(shape.len(), Ordering::Relaxed);
            Ok::<_, std::convert::Infallible>(
                shape
                    .labels()
                    .iter()
                    .map(|label| self.parameters.get(&canonical(label)).copied())
                    .collect(),
            )
        });
        match computed {
            Ok(slots) => slots,
            Err(never) => match never {},
        }
    }

    fn create(&self, owner: &ColumnsMapping<T>, shape: &RowShape, row: Vec<Value>) -> Result<T, MaterializeError> {
        let slots = self.slots(owner, shape);
        let mut args = vec![Value::Null; self.constructor.parameters().len()];

        for ((label, slot), value) in shape.labels().iter().zip(slots.iter()).zip(row) {
            if let Some(slot) = slot {
                args[slot.ordinal] = owner.convert(label, value, slot.data_type)?;
            }
        }

        self.constructor.invoke(args).map_err(|err| {
            let column = self.column_label(shape, &slots, err.field);
            MaterializeError::new(owner.columns.type_name(), &column, err)
        })
    }

    /// Row label feeding the parameter named `parameter`, or the parameter
    /// name when no column of the row was bound to it.
    fn column_label(&self, shape: &RowShape, slots: &[Option<ParameterSlot>], parameter: Option<&str>) -> String {
        let parameter = match parameter {
            Some(parameter) => parameter,
            None => return String::new(),
        };
        let ordinal = match self.parameters.get(&canonical(parameter)) {
            Some(slot) => slot.ordinal,
            None => return parameter.to_string(),
        };
        shape
            .labels()
            .iter()
            .zip(slots)
            .find(|(_, slot)| matches!(slot, Some(slot) if slot.ordinal == ordinal))
            .map_or_else(|| parameter.to_string(), |(label, _)| label.clone())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug)]
struct SetterSlot {
    accessor: usize,
    data_type: DataType,
}

struct SetterStrategy<T> {
    shapes: OnceMap<RowShape, Arc<[Option<SetterSlot>]>>,
    _object: std::marker::PhantomData<fn() -> T>,
}

impl<T> SetterStrategy<T> {
    fn new() -> Self {
        Self {
            shapes: OnceMap::new(),
            _object: std::marker::PhantomData,
        }
    }

    /// Column position to writable accessor and its declared type.
    fn slots(&self, owner: &ColumnsMapping<T>, shape: &RowShape) -> Arc<[Option<SetterSlot>]> {
        let computed = self.shapes.get_or_try_init(shape, || {
            owner.resolutions.fetch_add(shape.len(), Ordering::Relaxed);
            Ok::<_, std::convert::Infallible>(
                shape
                    .labels()
                    .iter()
                    .map(|label| {
                        let index = owner.columns.resolve_index(label)?;
                        let accessor = owner.columns.accessor(index);
                        accessor.is_writable().then(|| SetterSlot {
                            accessor: index,
                            data_type: accessor.data_type(),
                        })
                    })
                    .collect(),
            )
        });
        match computed {
            Ok(slots) => slots,
            Err(never) => match never {},
        }
    }
}

impl<T: Object> SetterStrategy<T> {
    fn create(&self, owner: &ColumnsMapping<T>, shape: &RowShape, row: Vec<Value>) -> Result<T> {
        let slots = self.slots(owner, shape);
        let mut object = T::instantiate().ok_or(ConfigError::NoConstructor {
            type_name: T::TYPE_NAME,
        })?;

        for ((label, slot), value) in shape.labels().iter().zip(slots.iter()).zip(row) {
            let Some(slot) = slot else { continue };
            let value = owner.convert(label, value, slot.data_type)?;
            owner
                .columns
                .accessor(slot.accessor)
                .set(&mut object, value)
                .map_err(|err| MaterializeError::new(T::TYPE_NAME, label, err))?;
        }

        Ok(object)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::DefaultColumnValueConverter,
        error::Error,
        object::{Accessor, ConstructorParameter},
        SqlValue,
    };

    #[derive(Debug, Default, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
        label: Option<String>,
    }

    fn point_accessors() -> Vec<(&'static str, Accessor<Point>)> {
        vec![
            (
                "x",
                Accessor::field("x", DataType::Int64, |p: &Point| p.x.to_value(), |p: &mut Point, v: Value| {
                    p.x = i64::from_value(v)?;
                    Ok(())
                }),
            ),
            (
                "y",
                Accessor::field("y", DataType::Int64, |p: &Point| p.y.to_value(), |p: &mut Point, v: Value| {
                    p.y = i64::from_value(v)?;
                    Ok(())
                }),
            ),
            (
                "label",
                Accessor::field(
                    "label",
                    DataType::String,
                    |p: &Point| p.label.to_value(),
                    |p: &mut Point, v: Value| {
                        p.label = Option::<String>::from_value(v)?;
                        Ok(())
                    },
                ),
            ),
        ]
    }

    fn point_constructor() -> Constructor<Point> {
        Constructor::new(
            vec![
                ConstructorParameter::new("x", DataType::Int64),
                ConstructorParameter::new("y", DataType::Int64),
                ConstructorParameter::new("label", DataType::String),
            ],
            |args: Vec<Value>| {
                let mut args = args.into_iter();
                Ok(Point {
                    x: i64::from_value(args.next().unwrap_or(Value::Null)).map_err(|e| e.for_field("x"))?,
                    y: i64::from_value(args.next().unwrap_or(Value::Null)).map_err(|e| e.for_field("y"))?,
                    label: Option::<String>::from_value(args.next().unwrap_or(Value::Null))
                        .map_err(|e| e.for_field("label"))?,
                })
            },
        )
    }

    /// Setter-only type.
    #[derive(Debug, PartialEq)]
    struct SetterPoint;
    /// Constructor-only type.
    #[derive(Debug, PartialEq)]
    struct CtorPoint;
    /// Constructor with setter fallback.
    #[derive(Debug, PartialEq)]
    struct FallbackPoint;
    /// Two designated constructors.
    #[derive(Debug, PartialEq)]
    struct AmbiguousPoint;

    macro_rules! point_object {
        ($marker:ident, ctors: $ctors:expr, instantiate: $inst:expr) => {
            impl $marker {
                fn mapping() -> Result<ColumnsMapping<Wrapped<$marker>>> {
                    let columns = ColumnToAccessorMap::<Wrapped<$marker>>::for_object()?;
                    ColumnsMapping::new(Arc::new(columns), Arc::new(DefaultColumnValueConverter))
                }
            }

            impl Object for Wrapped<$marker> {
                const TYPE_NAME: &'static str = stringify!($marker);
                const TABLE_NAME: &'static str = "point";

                fn accessors() -> Vec<(&'static str, Accessor<Self>)> {
                    point_accessors().into_iter().map(|(c, a)| (c, wrap(a))).collect()
                }

                fn constructors() -> Vec<Constructor<Self>> {
                    let n: usize = $ctors;
                    (0..n)
                        .map(|_| {
                            Constructor::new(point_constructor().parameters().to_vec(), |args| {
                                point_constructor().invoke(args).map(Wrapped::new)
                            })
                        })
                        .collect()
                }

                fn instantiate() -> Option<Self> {
                    let inst: bool = $inst;
                    inst.then(|| Wrapped::new(Point::default()))
                }
            }
        };
    }

    /// `Point` tagged with a marker so each test type gets its own strategy.
    #[derive(Debug, PartialEq)]
    struct Wrapped<M> {
        point: Point,
        _marker: std::marker::PhantomData<M>,
    }

    impl<M> Wrapped<M> {
        fn new(point: Point) -> Self {
            Self {
                point,
                _marker: std::marker::PhantomData,
            }
        }
    }

    fn wrap<M>(accessor: Accessor<Point>) -> Accessor<Wrapped<M>> {
        // Field accessors of `Point` re-targeted through the wrapper.
        let data_type = accessor.data_type();
        let name = match accessor.mechanism() {
            crate::object::Mechanism::Field(name) => *name,
            _ => "",
        };
        match name {
            "x" => Accessor::field(name, data_type, |w: &Wrapped<M>| w.point.x.to_value(), |w: &mut Wrapped<M>, v: Value| {
                w.point.x = i64::from_value(v)?;
                Ok(())
            }),
            "y" => Accessor::field(name, data_type, |w: &Wrapped<M>| w.point.y.to_value(), |w: &mut Wrapped<M>, v: Value| {
                w.point.y = i64::from_value(v)?;
                Ok(())
            }),
            _ => Accessor::field(
                "label",
                data_type,
                |w: &Wrapped<M>| w.point.label.to_value(),
                |w: &mut Wrapped<M>, v: Value| {
                    w.point.label = Option::<String>::from_value(v)?;
                    Ok(())
                },
            ),
        }
    }

    point_object!(SetterPoint, ctors: 0, instantiate: true);
    point_object!(CtorPoint, ctors: 1, instantiate: false);
    point_object!(FallbackPoint, ctors: 1, instantiate: true);
    point_object!(AmbiguousPoint, ctors: 2, instantiate: true);

    fn shape(labels: &[&str]) -> RowShape {
        RowShape::new(labels.iter().copied())
    }

    #[test]
    fn constructor_maps_columns_in_any_order() {
        let mapping = CtorPoint::mapping().unwrap();
        assert_eq!(mapping.strategy_name(), "constructor");

        let point = mapping
            .materialize_row(
                &shape(&["LABEL", "unknown", "y", "X"]),
                vec![
                    Value::String("p".into()),
                    Value::Int64(99),
                    Value::Int64(2),
                    Value::Int64(1),
                ],
            )
            .unwrap();
        assert_eq!(
            point.point,
            Point {
                x: 1,
                y: 2,
                label: Some("p".into())
            }
        );
    }

    #[test]
    fn setter_skips_unmapped_columns() {
        let mapping = SetterPoint::mapping().unwrap();
        assert_eq!(mapping.strategy_name(), "setter");

        let point = mapping
            .materialize_row(&shape(&["extra", "x"]), vec![Value::Int64(5), Value::Int64(3)])
            .unwrap();
        assert_eq!(point.point, Point { x: 3, ..Default::default() });
    }

    #[test]
    fn repeated_shape_reuses_derived_metadata() {
        let mapping = SetterPoint::mapping().unwrap();
        let first = shape(&["x", "y"]);
        mapping
            .materialize_row(&first, vec![Value::Int64(1), Value::Int64(2)])
            .unwrap();
        assert_eq!(mapping.shape_resolutions(), 2);

        // An equal shape built independently hits the cache.
        let again = shape(&["x", "y"]);
        mapping
            .materialize_row(&again, vec![Value::Int64(3), Value::Int64(4)])
            .unwrap();
        assert_eq!(mapping.shape_resolutions(), 2);
        assert_eq!(mapping.cached_shapes(), 1);

        // Different order is a different shape.
        mapping
            .materialize_row(&shape(&["y", "x"]), vec![Value::Int64(3), Value::Int64(4)])
            .unwrap();
        assert_eq!(mapping.shape_resolutions(), 4);
        assert_eq!(mapping.cached_shapes(), 2);
    }

    #[test]
    fn constructor_failure_falls_back_to_setters() {
        // `y` is not projected, so the constructor receives NULL for an i64.
        let row = vec![Value::Int64(8)];

        let mapping = FallbackPoint::mapping().unwrap();
        let point = mapping.materialize_row(&shape(&["x"]), row.clone()).unwrap();
        assert_eq!(point.point, Point { x: 8, ..Default::default() });

        let strict = CtorPoint::mapping().unwrap();
        match strict.materialize_row(&shape(&["x"]), row).unwrap_err() {
            Error::Materialize(err) => {
                assert_eq!(err.column, "y");
                assert_eq!(err.target_type, DataType::Int64);
                assert_eq!(err.value_type, "null");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn constructor_errors_report_the_row_label() {
        let strict = CtorPoint::mapping().unwrap();
        match strict
            .materialize_row(&shape(&["X", "Y"]), vec![Value::Int64(1), Value::Null])
            .unwrap_err()
        {
            Error::Materialize(err) => {
                assert_eq!(err.column, "Y");
                assert_eq!(err.value_type, "null");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn setter_type_errors_carry_column_context() {
        let mapping = SetterPoint::mapping().unwrap();
        match mapping
            .materialize_row(&shape(&["x"]), vec![Value::String("nope".into())])
            .unwrap_err()
        {
            Error::Materialize(err) => {
                assert_eq!(err.type_name, "SetterPoint");
                assert_eq!(err.column, "x");
                assert_eq!(err.value_type, "String");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn more_than_one_designated_constructor_is_rejected() {
        match AmbiguousPoint::mapping().err().unwrap() {
            Error::Config(err) => assert!(matches!(
                *err,
                ConfigError::AmbiguousConstructor { count: 2, .. }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }
}
