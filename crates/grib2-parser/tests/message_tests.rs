//! End-to-end decoding of synthetic messages.

use bytes::Bytes;
use grib2_parser::{first_message, DecodedGrid, Grib2Error, Grib2Message, Grib2Reader};
use test_utils::{assert_approx_eq, create_precipitation_grid, Grib2Builder};

#[test]
fn test_parse_message_metadata() {
    let data = Grib2Builder::new_regular_lat_lon()
        .with_forecast_hour(5)
        .build();
    let message = Grib2Message::parse(&data).unwrap();

    assert_eq!(message.parameter(), "APCP");
    assert_eq!(message.grid_dims(), (4, 5));
    assert_eq!(message.product_definition.forecast_time, 5);
    assert_eq!(message.product_definition.time_range_unit, 1);
}

#[test]
fn test_truncated_message_is_rejected() {
    let data = Grib2Builder::new_regular_lat_lon().build();
    let truncated = &data[..data.len() - 10];
    assert!(matches!(
        Grib2Message::parse(truncated),
        Err(Grib2Error::InvalidFormat(_))
    ));
}

#[test]
fn test_missing_end_section_is_rejected() {
    let mut data = Grib2Builder::new_regular_lat_lon().build();
    let n = data.len();
    data[n - 1] = b'8';
    assert!(Grib2Message::parse(&data).is_err());
}

#[test]
fn test_unpack_precipitation_values() {
    let values = create_precipitation_grid(5, 4, 11);
    let data = Grib2Builder::new_regular_lat_lon()
        .with_data(values.clone())
        .build();
    let unpacked = Grib2Message::parse(&data).unwrap().unpack_data().unwrap();

    assert_eq!(unpacked.len(), values.len());
    for (got, want) in unpacked.iter().zip(&values) {
        // 16-bit packing over a 50 mm range
        assert_approx_eq!(got.unwrap(), *want, 1e-3);
    }
}

#[test]
fn test_unpack_with_decimal_scale() {
    let data = Grib2Builder::new_regular_lat_lon()
        .with_decimal_scale(2)
        .with_gradient(0.0, 1.0)
        .build();
    let unpacked = Grib2Message::parse(&data).unwrap().unpack_data().unwrap();

    assert_approx_eq!(unpacked[0].unwrap(), 0.0, 1e-4);
    assert_approx_eq!(unpacked[10].unwrap(), 0.5, 1e-4);
}

#[test]
fn test_constant_field() {
    let data = Grib2Builder::new_regular_lat_lon()
        .with_constant_value(2.5)
        .build();
    let message = Grib2Message::parse(&data).unwrap();

    assert_eq!(message.data_representation.bits_per_value, 0);
    let unpacked = message.unpack_data().unwrap();
    assert!(unpacked.iter().all(|v| *v == Some(2.5)));
}

#[test]
fn test_unsupported_packing_template() {
    let data = Grib2Builder::new_regular_lat_lon()
        .with_gradient(0.0, 1.0)
        .with_data_template(40)
        .build();
    let message = Grib2Message::parse(&data).unwrap();

    assert!(matches!(
        message.unpack_data(),
        Err(Grib2Error::UnsupportedTemplate {
            section: 5,
            template: 40
        })
    ));
}

#[test]
fn test_reader_iterates_concatenated_messages() {
    let mut file = b"junk".to_vec();
    file.extend(Grib2Builder::new_regular_lat_lon().with_forecast_hour(1).build());
    file.extend(Grib2Builder::new_regular_lat_lon().with_forecast_hour(2).build());

    let mut reader = Grib2Reader::new(Bytes::from(file));
    let hours: Vec<u32> = std::iter::from_fn(|| reader.next_message().unwrap())
        .map(|m| m.product_definition.forecast_time)
        .collect();

    assert_eq!(hours, vec![1, 2]);
}

#[test]
fn test_first_message_empty_input() {
    assert!(first_message(Bytes::from_static(b"not a grib file")).is_err());
}

// ============================================================================
// Georeferencing
// ============================================================================

#[test]
fn test_decoded_grid_north_to_south() {
    // Row-major scanning from the north-west corner
    let values: Vec<f32> = (0..20).map(|v| v as f32).collect();
    let data = Grib2Builder::new_regular_lat_lon().with_data(values).build();
    let grid = DecodedGrid::from_message(&first_message(Bytes::from(data)).unwrap()).unwrap();

    assert_eq!((grid.shape.rows, grid.shape.cols), (4, 5));
    // First cell center is (13.0E, 51.75N), so the outer corner is half a cell off
    assert_approx_eq!(grid.transform.origin_x, 12.875, 1e-9);
    assert_approx_eq!(grid.transform.origin_y, 51.875, 1e-9);
    assert_approx_eq!(grid.transform.pixel_width, 0.25, 1e-9);
    assert_approx_eq!(grid.transform.pixel_height, -0.25, 1e-9);
    assert_approx_eq!(grid.values[0].unwrap(), 0.0, 1e-3);
    assert_approx_eq!(grid.values[19].unwrap(), 19.0, 1e-3);
}

#[test]
fn test_decoded_grid_south_to_north_is_flipped() {
    // DWD regular grids scan from the south-west corner
    let values: Vec<f32> = (0..20).map(|v| v as f32).collect();
    let data = Grib2Builder::new_regular_lat_lon()
        .south_to_north()
        .with_data(values)
        .build();
    let grid = DecodedGrid::from_message(&first_message(Bytes::from(data)).unwrap()).unwrap();

    assert_approx_eq!(grid.transform.origin_y, 51.875, 1e-9);
    // Row 0 of the output is the northernmost scanned row (values 15..20)
    assert_approx_eq!(grid.values[0].unwrap(), 15.0, 1e-3);
    assert_approx_eq!(grid.values[4].unwrap(), 19.0, 1e-3);
    assert_approx_eq!(grid.values[15].unwrap(), 0.0, 1e-3);
}

#[test]
fn test_decoded_grid_bitmap_points_are_none() {
    let data = Grib2Builder::new_regular_lat_lon()
        .with_gradient(1.0, 2.0)
        .with_missing(&[0, 19])
        .build();
    let grid = DecodedGrid::from_message(&first_message(Bytes::from(data)).unwrap()).unwrap();

    assert!(grid.values[0].is_none());
    assert!(grid.values[19].is_none());
    assert_eq!(grid.values.iter().filter(|v| v.is_some()).count(), 18);
}

#[test]
fn test_decoded_grid_reference_time_and_lead() {
    let reference = chrono_reference();
    let data = Grib2Builder::new_regular_lat_lon()
        .with_reference_time(reference)
        .with_forecast_hour(7)
        .build();
    let grid = DecodedGrid::from_message(&first_message(Bytes::from(data)).unwrap()).unwrap();

    assert_eq!(grid.reference_time, reference);
    assert_eq!(grid.forecast_time, 7);
}

fn chrono_reference() -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    chrono::Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap()
}
