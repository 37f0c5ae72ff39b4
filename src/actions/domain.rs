//! Subdomain selection and longitude recentring
//!
//! Domain centres are configured in true longitude/latitude and projected
//! onto the dataset's grid before the nearest-neighbour lookup: rotated-pole
//! grids use a spherical rotation with the convection-permitting model's
//! pole, transverse-mercator grids use the national grid projection on the
//! Airy 1830 ellipsoid.

use crate::cube::Dataset;
use crate::errors::{EtlError, Result};
use log::info;

/// Pole of the convection-permitting model's rotated grid.
const GRID_NORTH_POLE_LON: f64 = 177.5;
const GRID_NORTH_POLE_LAT: f64 = 37.5;

/// Named domain centres as (longitude, latitude).
const DOMAIN_CENTRES_LON_LAT: [(&str, f64, f64); 6] = [
    ("london", -0.118092, 51.509865),
    ("birmingham", -1.898575, 52.489471),
    ("glasgow", -4.25763, 55.86515),
    ("aberdeen", -2.09814, 57.14369),
    ("scotland", -4.2026458, 56.4906712),
    ("dublin", -6.267494, 53.344105),
];

fn domain_centre(name: &str) -> Result<(f64, f64)> {
    DOMAIN_CENTRES_LON_LAT
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, lon, lat)| (*lon, *lat))
        .ok_or_else(|| EtlError::Action {
            action: "select-subdomain".to_string(),
            message: format!("unknown domain '{}'", name),
        })
}

/// Project a true (lon, lat) point into rotated-pole coordinates with the
/// north pole at (`pole_lon`, `pole_lat`).
pub fn rotate_to_grid(lon: f64, lat: f64, pole_lon: f64, pole_lat: f64) -> (f64, f64) {
    let (lon, lat) = (lon.to_radians(), lat.to_radians());
    let pole_lon = pole_lon.to_radians();
    let tilt = std::f64::consts::FRAC_PI_2 - pole_lat.to_radians();

    let (x, y, z) = (lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());
    // rotate about z so the pole lies in the x-z plane, then tilt about y
    let x1 = x * pole_lon.cos() + y * pole_lon.sin();
    let y1 = -x * pole_lon.sin() + y * pole_lon.cos();
    let x2 = x1 * tilt.cos() - z * tilt.sin();
    let z2 = x1 * tilt.sin() + z * tilt.cos();

    // the rotated prime meridian faces away from the true pole
    let grid_lon = (-y1).atan2(-x2).to_degrees();
    let grid_lat = z2.asin().to_degrees();
    (grid_lon, grid_lat)
}

/// Project a (lon, lat) point to national grid easting/northing using the
/// transverse-mercator series on the Airy 1830 ellipsoid. No datum shift is
/// applied, which is well within one grid cell for the lookup here.
pub fn osgb_easting_northing(lon: f64, lat: f64) -> (f64, f64) {
    const A: f64 = 6_377_563.396;
    const B: f64 = 6_356_256.909;
    const F0: f64 = 0.999_601_271_7;
    const E0: f64 = 400_000.0;
    const N0: f64 = -100_000.0;
    let lat0 = 49.0_f64.to_radians();
    let lon0 = (-2.0_f64).to_radians();

    let e2 = 1.0 - (B * B) / (A * A);
    let n = (A - B) / (A + B);
    let phi = lat.to_radians();
    let lam = lon.to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();
    let nu = A * F0 / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let rho = A * F0 * (1.0 - e2) / (1.0 - e2 * sin_phi * sin_phi).powf(1.5);
    let eta2 = nu / rho - 1.0;

    let m = B * F0
        * ((1.0 + n + 1.25 * n * n + 1.25 * n * n * n) * (phi - lat0)
            - (3.0 * n + 3.0 * n * n + 2.625 * n * n * n)
                * (phi - lat0).sin()
                * (phi + lat0).cos()
            + (1.875 * n * n + 1.875 * n * n * n)
                * (2.0 * (phi - lat0)).sin()
                * (2.0 * (phi + lat0)).cos()
            - (35.0 / 24.0) * n * n * n * (3.0 * (phi - lat0)).sin() * (3.0 * (phi + lat0)).cos());

    let i = m + N0;
    let ii = nu / 2.0 * sin_phi * cos_phi;
    let iii = nu / 24.0 * sin_phi * cos_phi.powi(3) * (5.0 - tan_phi * tan_phi + 9.0 * eta2);
    let iiia = nu / 720.0
        * sin_phi
        * cos_phi.powi(5)
        * (61.0 - 58.0 * tan_phi * tan_phi + tan_phi.powi(4));
    let iv = nu * cos_phi;
    let v = nu / 6.0 * cos_phi.powi(3) * (nu / rho - tan_phi * tan_phi);
    let vi = nu / 120.0
        * cos_phi.powi(5)
        * (5.0 - 18.0 * tan_phi * tan_phi + tan_phi.powi(4) + 14.0 * eta2
            - 58.0 * tan_phi * tan_phi * eta2);

    let dl = lam - lon0;
    let northing = i + ii * dl * dl + iii * dl.powi(4) + iiia * dl.powi(6);
    let easting = E0 + iv * dl + v * dl.powi(3) + vi * dl.powi(5);
    (easting, northing)
}

/// The domain centre in the dataset's grid coordinates.
fn centre_in_grid(ds: &Dataset, name: &str) -> Result<(f64, f64)> {
    let (lon, lat) = domain_centre(name)?;
    match ds.grid_mapping_name()? {
        "rotated_latitude_longitude" => {
            let (grid_lon, grid_lat) =
                rotate_to_grid(lon, lat, GRID_NORTH_POLE_LON, GRID_NORTH_POLE_LAT);
            // rotated grids store longitude running over 360
            Ok((grid_lon + 360.0, grid_lat))
        }
        "latitude_longitude" => Ok((lon, lat)),
        "transverse_mercator" => Ok(osgb_easting_northing(lon, lat)),
        other => Err(EtlError::Generic(format!("unknown grid mapping {}", other))),
    }
}

fn nearest_index(values: &[f64], target: f64) -> Result<usize> {
    values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - target)
                .abs()
                .total_cmp(&(*b - target).abs())
        })
        .map(|(i, _)| i)
        .ok_or_else(|| EtlError::Generic("cannot search an empty coordinate".to_string()))
}

/// Cut a `size` x `size` window centred on the named domain.
pub fn select_subdomain(ds: Dataset, domain: &str, size: usize) -> Result<Dataset> {
    info!("Selecting subdomain {}", domain);
    let (centre_x, centre_y) = centre_in_grid(&ds, domain)?;
    let (y_dim, x_dim) = ds.grid_dim_names()?;
    let y_values = ds.coord_values(y_dim)?;
    let x_values = ds.coord_values(x_dim)?;

    let centre_x_idx = nearest_index(&x_values, centre_x)?;
    let centre_y_idx = nearest_index(&y_values, centre_y)?;

    let radius = (size - 1) / 2;
    let window = |centre_idx: usize, len: usize, dim: &str| -> Result<Vec<usize>> {
        let start = centre_idx.checked_sub(radius).ok_or_else(|| EtlError::Action {
            action: "select-subdomain".to_string(),
            message: format!("window of {} extends past the {} axis start", size, dim),
        })?;
        if start + size > len {
            return Err(EtlError::Action {
                action: "select-subdomain".to_string(),
                message: format!("window of {} extends past the {} axis end", size, dim),
            });
        }
        Ok((start..start + size).collect())
    };

    let ds = ds
        .select_dim_indices(x_dim, &window(centre_x_idx, x_values.len(), x_dim)?)
        .select_dim_indices(y_dim, &window(centre_y_idx, y_values.len(), y_dim)?);

    let mut ds = ds;
    ds.set_attr("domain", format!("{}-{}", domain, size));
    Ok(ds)
}

/// Recentre a global longitude axis from [0, 360) to [-180, 180) so a
/// domain of interest does not straddle the wrap point.
pub fn shift_lon_break(ds: Dataset) -> Result<Dataset> {
    info!("Shifting longitude break");
    let (_, x_dim) = ds.grid_dim_names()?;
    let x_dim = x_dim.to_string();
    let lon_values = ds.coord_values(&x_dim)?;

    let shifted: Vec<f64> = lon_values
        .iter()
        .map(|&lon| (lon + 180.0).rem_euclid(360.0) - 180.0)
        .collect();
    let mut order: Vec<usize> = (0..shifted.len()).collect();
    order.sort_by(|&a, &b| shifted[a].total_cmp(&shifted[b]));

    let mut ds = ds.select_dim_indices(&x_dim, &order);
    let coord = ds.coords.get_mut(&x_dim).ok_or_else(|| EtlError::CoordNotFound {
        coord: x_dim.clone(),
    })?;
    for v in coord.values.iter_mut() {
        *v = (*v + 180.0).rem_euclid(360.0) - 180.0;
    }
    let bnds_name = format!("{}_bnds", x_dim);
    if let Some(bnds) = ds.coords.get_mut(&bnds_name) {
        for v in bnds.values.iter_mut() {
            *v = (*v + 180.0).rem_euclid(360.0) - 180.0;
        }
    }
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::grid_dataset;

    #[test]
    fn rotated_pole_projection() {
        // London sits just south-east of the rotated grid origin
        let (grid_lon, grid_lat) =
            rotate_to_grid(-0.118092, 51.509865, GRID_NORTH_POLE_LON, GRID_NORTH_POLE_LAT);
        assert!((grid_lon - 1.48).abs() < 0.05, "grid_lon = {}", grid_lon);
        assert!((grid_lat + 0.98).abs() < 0.05, "grid_lat = {}", grid_lat);
    }

    #[test]
    fn national_grid_projection() {
        // the projection's true origin maps to the false origin offsets
        let (e, n) = osgb_easting_northing(-2.0, 49.0);
        assert!((e - 400_000.0).abs() < 1.0, "easting = {}", e);
        assert!((n + 100_000.0).abs() < 1.0, "northing = {}", n);
    }

    #[test]
    fn subdomain_window_is_square() {
        // grid centred near London's rotated coordinates
        let mut ds = grid_dataset(41, 41);
        let lat: Vec<f64> = (0..41).map(|i| -3.0 + 0.1 * i as f64).collect();
        let lon: Vec<f64> = (0..41).map(|i| 359.5 + 0.1 * i as f64).collect();
        ds.coords.get_mut("grid_latitude").unwrap().values =
            ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[41]), lat).unwrap();
        ds.coords.get_mut("grid_longitude").unwrap().values =
            ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[41]), lon).unwrap();

        let out = select_subdomain(ds, "london", 9).unwrap();
        assert_eq!(out.var("pr").unwrap().data.shape(), &[2, 9, 9]);
        assert_eq!(out.attr_text("domain"), Some("london-9"));
    }

    #[test]
    fn subdomain_rejects_window_off_grid() {
        let ds = grid_dataset(4, 4);
        assert!(select_subdomain(ds, "london", 64).is_err());
    }

    #[test]
    fn lon_break_shift_sorts_axis() {
        let mut ds = grid_dataset(2, 4);
        ds.coords.get_mut("grid_longitude").unwrap().values =
            ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[4]), vec![0.0, 90.0, 180.0, 270.0])
                .unwrap();
        // pretend this is a regular lat-lon global grid
        ds.rename("grid_longitude", "longitude");
        ds.rename("grid_latitude", "latitude");
        ds.coords.remove("rotated_latitude_longitude");
        ds.coords
            .insert("latitude_longitude".to_string(), crate::cube::Coord::new_scalar());

        let out = shift_lon_break(ds).unwrap();
        let lon = out.coord_values("longitude").unwrap();
        assert_eq!(lon, vec![-180.0, -90.0, 0.0, 90.0]);
    }
}
